//! Contact aggregate.
//!
//! A contact is a counterparty we negotiate with. It carries the exchange
//! tally its reliability score is derived from, the activity timestamps the
//! inactivity rule looks at, and what we learned about how it negotiates.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::identity::{ContactIdentity, DiscoveryInfo};
use super::status::ContactStatus;
use crate::domain::exchange::{ExchangeStatus, Terms};
use crate::domain::foundation::{
    ContactId, DomainError, ErrorCode, StateMachine, Timestamp, ValidationError,
};
use crate::domain::reliability::{ExchangeTally, ReliabilityScore};

/// Longest tag accepted.
pub const MAX_TAG_LENGTH: usize = 64;

/// What we have learned about a contact's negotiating habits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPreferences {
    /// Terms most recently agreed with this contact.
    pub preferred_terms: Option<Terms>,
    /// Running mean of seconds between our outreach and their reply.
    pub avg_response_secs: Option<u64>,
    pub response_samples: u32,
}

impl LearnedPreferences {
    fn record_latency(&mut self, secs: u64) {
        let samples = u64::from(self.response_samples);
        let mean = self.avg_response_secs.unwrap_or(0);
        self.avg_response_secs = Some((mean * samples + secs) / (samples + 1));
        self.response_samples = self.response_samples.saturating_add(1);
    }
}

/// Result of a score recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recomputed {
    pub previous_score: ReliabilityScore,
    pub score: ReliabilityScore,
    /// Set when the recomputation also changed the status.
    pub status_change: Option<(ContactStatus, ContactStatus)>,
}

/// Contact aggregate.
///
/// # Invariants
///
/// - `tally.successful + tally.failed <= tally.total`
/// - `reliability_score` equals the scorer's output for `tally` after every recompute
/// - `status_before_block` is set iff the status is `blocked`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    id: ContactId,
    identity: ContactIdentity,
    discovery: DiscoveryInfo,
    status: ContactStatus,
    status_before_block: Option<ContactStatus>,
    block_reason: Option<String>,
    flag_reason: Option<String>,
    reliability_score: ReliabilityScore,
    tally: ExchangeTally,
    preferences: LearnedPreferences,
    tags: BTreeSet<String>,
    first_contact_at: Option<Timestamp>,
    last_contact_at: Option<Timestamp>,
    last_response_at: Option<Timestamp>,
    last_exchange_at: Option<Timestamp>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

/// Persisted form of a [`Contact`].
#[derive(Debug, Clone)]
pub struct ContactParts {
    pub id: ContactId,
    pub identity: ContactIdentity,
    pub discovery: DiscoveryInfo,
    pub status: ContactStatus,
    pub status_before_block: Option<ContactStatus>,
    pub block_reason: Option<String>,
    pub flag_reason: Option<String>,
    pub reliability_score: ReliabilityScore,
    pub tally: ExchangeTally,
    pub preferences: LearnedPreferences,
    pub tags: BTreeSet<String>,
    pub first_contact_at: Option<Timestamp>,
    pub last_contact_at: Option<Timestamp>,
    pub last_response_at: Option<Timestamp>,
    pub last_exchange_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Contact {
    /// Creates a freshly discovered contact with a neutral score.
    pub fn discover(identity: ContactIdentity, discovery: DiscoveryInfo, at: Timestamp) -> Self {
        Self {
            id: ContactId::new(),
            identity,
            discovery,
            status: ContactStatus::Discovered,
            status_before_block: None,
            block_reason: None,
            flag_reason: None,
            reliability_score: ReliabilityScore::neutral(),
            tally: ExchangeTally::default(),
            preferences: LearnedPreferences::default(),
            tags: BTreeSet::new(),
            first_contact_at: None,
            last_contact_at: None,
            last_response_at: None,
            last_exchange_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Reconstitute from persistence (no validation).
    pub fn reconstitute(parts: ContactParts) -> Self {
        Self {
            id: parts.id,
            identity: parts.identity,
            discovery: parts.discovery,
            status: parts.status,
            status_before_block: parts.status_before_block,
            block_reason: parts.block_reason,
            flag_reason: parts.flag_reason,
            reliability_score: parts.reliability_score,
            tally: parts.tally,
            preferences: parts.preferences,
            tags: parts.tags,
            first_contact_at: parts.first_contact_at,
            last_contact_at: parts.last_contact_at,
            last_response_at: parts.last_response_at,
            last_exchange_at: parts.last_exchange_at,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> ContactId {
        self.id
    }

    pub fn identity(&self) -> &ContactIdentity {
        &self.identity
    }

    pub fn discovery(&self) -> &DiscoveryInfo {
        &self.discovery
    }

    pub fn display_name(&self) -> Option<&str> {
        self.discovery.display_name.as_deref()
    }

    pub fn status(&self) -> ContactStatus {
        self.status
    }

    pub fn status_before_block(&self) -> Option<ContactStatus> {
        self.status_before_block
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.block_reason.as_deref()
    }

    pub fn flag_reason(&self) -> Option<&str> {
        self.flag_reason.as_deref()
    }

    pub fn reliability_score(&self) -> ReliabilityScore {
        self.reliability_score
    }

    pub fn tally(&self) -> ExchangeTally {
        self.tally
    }

    pub fn preferences(&self) -> &LearnedPreferences {
        &self.preferences
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn first_contact_at(&self) -> Option<Timestamp> {
        self.first_contact_at
    }

    pub fn last_contact_at(&self) -> Option<Timestamp> {
        self.last_contact_at
    }

    pub fn last_response_at(&self) -> Option<Timestamp> {
        self.last_response_at
    }

    pub fn last_exchange_at(&self) -> Option<Timestamp> {
        self.last_exchange_at
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn is_blocked(&self) -> bool {
        self.status == ContactStatus::Blocked
    }

    /// Most recent of outreach, reply or finished exchange; falls back to discovery.
    pub fn last_activity_at(&self) -> Timestamp {
        [
            self.last_contact_at,
            self.last_response_at,
            self.last_exchange_at,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(self.created_at)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Activity
    // ─────────────────────────────────────────────────────────────────────────

    /// Records outreach from us.
    ///
    /// Returns `false` without changes when `at` is not newer than the last
    /// recorded outreach. Unresponsive contacts are re-activated.
    pub fn mark_contacted(&mut self, at: Timestamp) -> Result<bool, DomainError> {
        self.ensure_not_blocked()?;
        if self.last_contact_at.is_some_and(|last| !at.is_after(&last)) {
            return Ok(false);
        }

        self.first_contact_at.get_or_insert(at);
        self.last_contact_at = Some(at);
        self.advance(ContactStatus::Contacted);
        self.updated_at = at;
        Ok(true)
    }

    /// Records a reply from the contact.
    ///
    /// Same out-of-order guard as [`Contact::mark_contacted`]. The first reply
    /// after each outreach feeds the response-time average.
    pub fn mark_responded(&mut self, at: Timestamp) -> Result<bool, DomainError> {
        self.ensure_not_blocked()?;
        if self.last_response_at.is_some_and(|last| !at.is_after(&last)) {
            return Ok(false);
        }

        if let Some(contacted) = self.last_contact_at {
            let first_reply = self
                .last_response_at
                .map_or(true, |last| last.is_before(&contacted));
            if first_reply && contacted.is_before(&at) {
                let secs = at.duration_since(&contacted).num_seconds().max(0) as u64;
                self.preferences.record_latency(secs);
            }
        }

        self.last_response_at = Some(at);
        self.advance(ContactStatus::Responded);
        self.updated_at = at;
        Ok(true)
    }

    /// Promotes the contact after a completed exchange.
    pub fn mark_active_saved(&mut self, at: Timestamp) -> Result<bool, DomainError> {
        self.ensure_not_blocked()?;
        let changed = self.advance(ContactStatus::ActiveSaved);
        if changed {
            self.updated_at = at;
        }
        Ok(changed)
    }

    /// Marks the contact as not answering. No-op for blocked contacts.
    pub fn mark_unresponsive(&mut self, at: Timestamp) -> bool {
        if self.is_blocked() {
            return false;
        }
        let changed = self.advance(ContactStatus::Unresponsive);
        if changed {
            self.updated_at = at;
        }
        changed
    }

    /// Counts a finished exchange. Returns whether the tally changed.
    ///
    /// `no_response` exchanges never reached agreement and are not counted.
    pub fn record_exchange_outcome(&mut self, outcome: ExchangeStatus, at: Timestamp) -> bool {
        match outcome {
            ExchangeStatus::Completed => {
                self.tally.total += 1;
                self.tally.successful += 1;
            }
            ExchangeStatus::PartnerDidNotComplete => {
                self.tally.total += 1;
                self.tally.failed += 1;
            }
            ExchangeStatus::Failed => {
                self.tally.total += 1;
            }
            _ => return false,
        }
        self.last_exchange_at = Some(self.last_exchange_at.map_or(at, |last| last.max(at)));
        self.updated_at = at;
        true
    }

    pub fn learn_agreed_terms(&mut self, terms: Terms) {
        self.preferences.preferred_terms = Some(terms);
    }

    /// Whether a recompute would change the status: the contact is flagged,
    /// or we are waiting on it and it has been quiet since before `idle_before`.
    pub fn recompute_due(&self, idle_before: Timestamp) -> bool {
        if self.is_blocked() {
            return false;
        }
        self.flag_reason.is_some()
            || (self.status.awaits_activity() && self.last_activity_at().is_before(&idle_before))
    }

    /// Re-derives the score from the tally and applies the status rules:
    /// flagged contacts get blocked, contacts we are waiting on go
    /// unresponsive after `inactivity_window` without activity.
    pub fn recompute(&mut self, now: Timestamp, inactivity_window: Duration) -> Recomputed {
        let previous_score = self.reliability_score;
        self.reliability_score = self.tally.score();

        let before = self.status;
        if let Some(reason) = self.flag_reason.clone() {
            self.block(reason, now);
        } else if self.status.awaits_activity()
            && self.last_activity_at().is_before(&now.minus(inactivity_window))
        {
            self.advance(ContactStatus::Unresponsive);
        }
        if before != self.status || previous_score != self.reliability_score {
            self.updated_at = now;
        }

        Recomputed {
            previous_score,
            score: self.reliability_score,
            status_change: (before != self.status).then_some((before, self.status)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Moderation
    // ─────────────────────────────────────────────────────────────────────────

    /// Marks the contact for blocking at the next recompute.
    pub fn flag(&mut self, reason: impl Into<String>, at: Timestamp) {
        self.flag_reason = Some(reason.into());
        self.updated_at = at;
    }

    /// Blocks the contact. Returns `false` if it was already blocked.
    pub fn block(&mut self, reason: impl Into<String>, at: Timestamp) -> bool {
        if self.is_blocked() {
            return false;
        }
        self.status_before_block = Some(self.status);
        self.status = ContactStatus::Blocked;
        self.block_reason = Some(reason.into());
        self.updated_at = at;
        true
    }

    /// Lifts a block and restores the status held before it. Clears any flag.
    pub fn unblock(&mut self, at: Timestamp) -> Result<ContactStatus, DomainError> {
        if !self.is_blocked() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("contact {} is not blocked", self.id),
            ));
        }
        self.status = self
            .status_before_block
            .take()
            .unwrap_or(ContactStatus::Discovered);
        self.block_reason = None;
        self.flag_reason = None;
        self.updated_at = at;
        Ok(self.status)
    }

    /// Adds a normalized tag. Returns `false` if it was already present.
    pub fn add_tag(&mut self, tag: &str, at: Timestamp) -> Result<bool, ValidationError> {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            return Err(ValidationError::empty_field("tag"));
        }
        if tag.len() > MAX_TAG_LENGTH {
            return Err(ValidationError::out_of_range(
                "tag",
                1,
                MAX_TAG_LENGTH as i64,
                tag.len() as i64,
            ));
        }
        let added = self.tags.insert(tag);
        if added {
            self.updated_at = at;
        }
        Ok(added)
    }

    pub fn remove_tag(&mut self, tag: &str, at: Timestamp) -> bool {
        let removed = self.tags.remove(&tag.trim().to_lowercase());
        if removed {
            self.updated_at = at;
        }
        removed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn ensure_not_blocked(&self) -> Result<(), DomainError> {
        if self.is_blocked() {
            return Err(DomainError::new(
                ErrorCode::ContactBlocked,
                format!("contact {} is blocked", self.id),
            ));
        }
        Ok(())
    }

    /// Moves forward to `target` when allowed; unresponsive contacts pass
    /// through `contacted` on the way.
    fn advance(&mut self, target: ContactStatus) -> bool {
        if self.status == target {
            return false;
        }
        let reachable = self.status.can_transition_to(&target)
            || (self.status == ContactStatus::Unresponsive
                && ContactStatus::Contacted.can_transition_to(&target));
        if reachable {
            self.status = target;
        }
        reachable
    }
}
