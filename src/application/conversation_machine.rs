//! ConversationStateMachine - turns inbound events into negotiation steps.
//!
//! All work for one contact runs inside that contact's section, so inbound
//! messages, execution reports, verifications, expiry and blocking never
//! interleave for the same contact. Rejected events (invalid for the current
//! phase, or older than the last applied event) change nothing and are
//! written to the audit log.

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::contact_registry::ContactRegistry;
use super::errors::BrokerError;
use super::exchange_ledger::ExchangeLedger;
use super::locks::KeyedLocks;
use super::profile_pool::ProfileHandle;
use crate::config::NegotiationConfig;
use crate::domain::contact::{Contact, ContactStatus, Recomputed};
use crate::domain::conversation::{Conversation, NegotiationContext, NegotiationPhase};
use crate::domain::exchange::{
    ActionResults, Exchange, ExchangeStatus, Party, Terms, TranscriptEntry,
};
use crate::domain::foundation::{ContactId, ErrorCode, ExchangeId, Timestamp};
use crate::ports::{AuditEntry, AuditKind, AuditLog, ConversationRepository};

/// Timing and counter-offer rules.
#[derive(Debug, Clone)]
pub struct NegotiationPolicy {
    /// How long `waiting_response` lasts.
    pub response_timeout: Duration,
    /// How long `negotiating_terms` lasts.
    pub negotiation_timeout: Duration,
    /// Per-action caps for counter-offers; `None` mirrors inbound terms as-is.
    pub counter_limits: Option<Terms>,
}

impl NegotiationPolicy {
    pub fn from_config(config: &NegotiationConfig) -> Self {
        Self {
            response_timeout: config.response_timeout(),
            negotiation_timeout: config.negotiation_timeout(),
            counter_limits: config.counter_limits(),
        }
    }

    /// Our answer to `theirs`: operator-pinned terms win, otherwise their
    /// terms capped by our limits.
    pub fn counter_offer(&self, context: &NegotiationContext, theirs: &Terms) -> Option<Terms> {
        if context.our_terms_pinned {
            return context.our_terms.clone();
        }
        match &self.counter_limits {
            Some(limits) => theirs.capped_by(limits),
            None => Some(theirs.clone()),
        }
    }
}

/// A chat message from the contact, as classified upstream.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub text: String,
    pub terms: Option<Terms>,
    pub video_url: Option<String>,
    pub at: Timestamp,
}

/// Our opening offer to a contact.
#[derive(Debug, Clone)]
pub struct Outreach {
    pub terms: Terms,
    pub message: Option<String>,
    pub video_url: Option<String>,
    pub at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub exchange_id: ExchangeId,
    pub results: ActionResults,
    /// The platform restricted the profile that performed the actions.
    pub ban_detected: bool,
    pub at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub exchange_id: ExchangeId,
    pub results: ActionResults,
    /// The partner's actions can never be confirmed (e.g. video removed).
    pub impossible: bool,
    pub at: Timestamp,
}

/// Where a contact's negotiation stands after an event.
///
/// `conversation` is `None` once the negotiation ended; `exchange` then
/// holds the closed exchange.
#[derive(Debug, Clone, Serialize)]
pub struct NegotiationSnapshot {
    pub conversation: Option<Conversation>,
    pub exchange: Option<Exchange>,
}

/// What an expiry did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub contact_id: ContactId,
    pub phase: NegotiationPhase,
    pub exchange_outcome: Option<ExchangeStatus>,
}

pub struct ConversationStateMachine {
    conversations: Arc<dyn ConversationRepository>,
    contacts: Arc<ContactRegistry>,
    ledger: Arc<ExchangeLedger>,
    audit: Arc<dyn AuditLog>,
    sections: KeyedLocks<ContactId>,
    policy: NegotiationPolicy,
}

impl ConversationStateMachine {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        contacts: Arc<ContactRegistry>,
        ledger: Arc<ExchangeLedger>,
        audit: Arc<dyn AuditLog>,
        policy: NegotiationPolicy,
    ) -> Self {
        Self {
            conversations,
            contacts,
            ledger,
            audit,
            sections: KeyedLocks::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &NegotiationPolicy {
        &self.policy
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound events
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies a message from the contact.
    ///
    /// Starts a conversation if none is active. Terms move the negotiation
    /// to `negotiating_terms`, trigger our counter-offer and, when both sides
    /// match, agreement and `waiting_execution`.
    pub async fn handle_inbound_message(
        &self,
        contact_id: ContactId,
        message: InboundMessage,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let at = message.at;
        let _section = self.sections.lock(contact_id).await;
        let result = self.apply_inbound(contact_id, message).await;
        self.audited(contact_id, at, result).await
    }

    /// Opens a negotiation from our side.
    pub async fn start_outreach(
        &self,
        contact_id: ContactId,
        outreach: Outreach,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let at = outreach.at;
        let _section = self.sections.lock(contact_id).await;
        let result = self.apply_outreach(contact_id, outreach).await;
        self.audited(contact_id, at, result).await
    }

    /// Replaces our proposal with operator-chosen terms.
    pub async fn propose_terms(
        &self,
        contact_id: ContactId,
        terms: Terms,
        at: Timestamp,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let _section = self.sections.lock(contact_id).await;
        let result = self.apply_proposal(contact_id, terms, at).await;
        self.audited(contact_id, at, result).await
    }

    /// Leases a profile to execute our side of the agreed exchange.
    pub async fn begin_execution(
        &self,
        contact_id: ContactId,
        at: Timestamp,
    ) -> Result<(NegotiationSnapshot, ProfileHandle), BrokerError> {
        let _section = self.sections.lock(contact_id).await;
        let result = self.apply_begin_execution(contact_id, at).await;
        self.audited(contact_id, at, result).await
    }

    /// Applies our execution report. Valid only in `waiting_execution`.
    pub async fn handle_execution_report(
        &self,
        contact_id: ContactId,
        report: ExecutionReport,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let at = report.at;
        let _section = self.sections.lock(contact_id).await;
        let result = self.apply_execution(contact_id, report).await;
        self.audited(contact_id, at, result).await
    }

    /// Applies a verification of the partner. Valid only in `verifying_completion`.
    pub async fn handle_verification(
        &self,
        contact_id: ContactId,
        report: VerificationReport,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let at = report.at;
        let _section = self.sections.lock(contact_id).await;
        let result = self.apply_verification(contact_id, report).await;
        self.audited(contact_id, at, result).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timeouts and cancellation
    // ─────────────────────────────────────────────────────────────────────────

    /// Ends the contact's conversation if its deadline passed before `now`.
    ///
    /// A conversation still waiting for a first response marks the contact
    /// unresponsive unless it wrote to us after the conversation opened; a
    /// linked exchange is timed out. Returns `None` when
    /// there was nothing to expire.
    pub async fn expire(
        &self,
        contact_id: ContactId,
        now: Timestamp,
    ) -> Result<Option<Expiry>, BrokerError> {
        let _section = self.sections.lock(contact_id).await;

        let Some(conversation) = self.conversations.find_by_contact(contact_id).await? else {
            return Ok(None);
        };
        if !conversation.is_expired(now) {
            return Ok(None);
        }

        let exchange_outcome = match self.linked_exchange(&conversation).await? {
            Some(mut exchange) => self.ledger.time_out(&mut exchange, now).await?,
            None => None,
        };
        if conversation.phase().expiry_means_unresponsive()
            && !self.replied_since(contact_id, conversation.created_at()).await?
        {
            self.contacts.mark_unresponsive(contact_id, now).await?;
        }
        self.conversations.delete(contact_id).await?;

        info!(
            contact_id = %contact_id,
            phase = %conversation.phase(),
            outcome = ?exchange_outcome,
            "Conversation expired"
        );
        Ok(Some(Expiry {
            contact_id,
            phase: conversation.phase(),
            exchange_outcome,
        }))
    }

    /// Times out an overdue exchange, ending its conversation if it has one.
    pub async fn expire_exchange(
        &self,
        exchange_id: ExchangeId,
        now: Timestamp,
    ) -> Result<Option<ExchangeStatus>, BrokerError> {
        let contact_id = self.ledger.get(exchange_id).await?.contact_id();
        let _section = self.sections.lock(contact_id).await;

        // Re-read inside the section; another event may have settled it.
        let mut exchange = self.ledger.get(exchange_id).await?;
        if !exchange.is_overdue(now) {
            return Ok(None);
        }
        let outcome = self.ledger.time_out(&mut exchange, now).await?;

        if let Some(conversation) = self.conversations.find_by_contact(contact_id).await? {
            if conversation.exchange_id() == Some(exchange_id) {
                self.conversations.delete(contact_id).await?;
            }
        }
        Ok(outcome)
    }

    /// Blocks a contact, cancelling whatever negotiation is in flight.
    pub async fn block_contact(
        &self,
        contact_id: ContactId,
        reason: &str,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let _section = self.sections.lock(contact_id).await;

        self.contacts.block(contact_id, reason, at).await?;
        self.cancel_active(contact_id, at).await?;
        self.contacts.get(contact_id).await
    }

    pub async fn unblock_contact(
        &self,
        contact_id: ContactId,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let _section = self.sections.lock(contact_id).await;
        self.contacts.unblock(contact_id, at).await?;
        self.contacts.get(contact_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Contact maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Flags a contact; it is blocked at its next recompute.
    pub async fn flag_contact(
        &self,
        contact_id: ContactId,
        reason: &str,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let _section = self.sections.lock(contact_id).await;
        self.contacts.flag(contact_id, reason, at).await
    }

    pub async fn tag_contact(
        &self,
        contact_id: ContactId,
        tag: &str,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let _section = self.sections.lock(contact_id).await;
        self.contacts.tag(contact_id, tag, at).await
    }

    pub async fn untag_contact(
        &self,
        contact_id: ContactId,
        tag: &str,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        let _section = self.sections.lock(contact_id).await;
        self.contacts.untag(contact_id, tag, at).await
    }

    /// Recomputes the score and status rules. A contact blocked by the
    /// recompute loses its active negotiation the same way `block_contact`
    /// cancels it.
    pub async fn recompute_contact(
        &self,
        contact_id: ContactId,
        now: Timestamp,
    ) -> Result<Recomputed, BrokerError> {
        let _section = self.sections.lock(contact_id).await;
        let recomputed = self.contacts.recompute_score(contact_id, now).await?;
        if let Some((_, ContactStatus::Blocked)) = recomputed.status_change {
            self.cancel_active(contact_id, now).await?;
        }
        Ok(recomputed)
    }

    /// Contacts the sweeper should recompute.
    pub async fn recompute_due(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<ContactId>, BrokerError> {
        self.contacts.recompute_due(now, limit).await
    }

    /// Current negotiation state for a contact.
    pub async fn snapshot(&self, contact_id: ContactId) -> Result<NegotiationSnapshot, BrokerError> {
        let conversation = self.conversations.find_by_contact(contact_id).await?;
        let exchange = match &conversation {
            Some(c) => self.linked_exchange(c).await?,
            None => self.ledger.for_contact(contact_id).await?.into_iter().next(),
        };
        Ok(NegotiationSnapshot {
            conversation,
            exchange,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event application (caller holds the section)
    // ─────────────────────────────────────────────────────────────────────────

    async fn apply_inbound(
        &self,
        contact_id: ContactId,
        message: InboundMessage,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let InboundMessage {
            text,
            terms,
            video_url,
            at,
        } = message;

        self.ensure_not_blocked(contact_id).await?;
        let existing = self.conversations.find_by_contact(contact_id).await?;
        if let Some(conversation) = &existing {
            ensure_fresh(conversation, at)?;
            if terms.is_some() && !conversation.phase().accepts_proposals() {
                return Err(BrokerError::invalid_transition(format!(
                    "terms received while {}",
                    conversation.phase()
                )));
            }
        }

        self.contacts.mark_responded(contact_id, at).await?;
        let mut conversation = match existing {
            Some(conversation) => conversation,
            None => self.start_conversation(contact_id, at).await?,
        };
        let mut exchange = self.linked_exchange(&conversation).await?;

        let context = conversation.context_mut();
        context.last_message = Some(text.clone());
        context.messages_seen = context.messages_seen.saturating_add(1);
        if video_url.is_some() {
            context.their_video_url = video_url.clone();
        }

        match terms {
            Some(theirs) => {
                if conversation.phase() == NegotiationPhase::WaitingResponse {
                    let deadline = at.plus(self.policy.negotiation_timeout);
                    enter(&mut conversation, NegotiationPhase::NegotiatingTerms, at, deadline)?;
                }
                conversation.context_mut().their_terms = Some(theirs.clone());

                let mut current = match exchange.take() {
                    Some(current) => current,
                    None => self.open_exchange(&mut conversation, Party::Them, at).await?,
                };
                let entry = TranscriptEntry::inbound(text, Some(theirs.clone()), at);
                self.ledger
                    .record_message(&mut current, entry, video_url.as_deref())
                    .await?;
                self.ledger
                    .propose(&mut current, Party::Them, theirs.clone(), at)
                    .await?;

                if let Some(counter) = self.policy.counter_offer(conversation.context(), &theirs) {
                    if current.proposal(Party::Us) != Some(&counter) {
                        self.ledger
                            .propose(&mut current, Party::Us, counter.clone(), at)
                            .await?;
                    }
                    conversation.context_mut().our_terms = Some(counter);
                }
                self.try_agree(&mut conversation, &mut current, at).await?;
                exchange = Some(current);
            }
            None => {
                if let Some(current) = exchange.as_mut() {
                    let entry = TranscriptEntry::inbound(text, None, at);
                    self.ledger
                        .record_message(current, entry, video_url.as_deref())
                        .await?;
                }
            }
        }

        self.finish(conversation, exchange, at).await
    }

    async fn apply_outreach(
        &self,
        contact_id: ContactId,
        outreach: Outreach,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let Outreach {
            terms,
            message,
            video_url,
            at,
        } = outreach;

        self.ensure_not_blocked(contact_id).await?;
        if self.conversations.find_by_contact(contact_id).await?.is_some() {
            return Err(BrokerError::invalid_transition(format!(
                "contact {} already has an active conversation",
                contact_id
            )));
        }

        self.contacts.mark_contacted(contact_id, at).await?;
        let mut conversation = self.start_conversation(contact_id, at).await?;
        let mut exchange = self.open_exchange(&mut conversation, Party::Us, at).await?;

        let text = message.unwrap_or_else(|| format!("offering {}", terms));
        self.ledger
            .record_message(
                &mut exchange,
                TranscriptEntry::outbound(text, None, at),
                video_url.as_deref(),
            )
            .await?;
        self.ledger
            .propose(&mut exchange, Party::Us, terms.clone(), at)
            .await?;
        conversation.context_mut().our_terms = Some(terms);

        info!(contact_id = %contact_id, exchange_id = %exchange.id(), "Outreach started");
        self.finish(conversation, Some(exchange), at).await
    }

    async fn apply_proposal(
        &self,
        contact_id: ContactId,
        terms: Terms,
        at: Timestamp,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let mut conversation = self.active_conversation(contact_id).await?;
        ensure_fresh(&conversation, at)?;
        if !conversation.phase().accepts_proposals() {
            return Err(BrokerError::invalid_transition(format!(
                "cannot change our terms while {}",
                conversation.phase()
            )));
        }

        let context = conversation.context_mut();
        context.our_terms = Some(terms.clone());
        context.our_terms_pinned = true;

        let mut exchange = match self.linked_exchange(&conversation).await? {
            Some(exchange) => exchange,
            None => self.open_exchange(&mut conversation, Party::Us, at).await?,
        };
        self.ledger
            .propose(&mut exchange, Party::Us, terms, at)
            .await?;
        self.try_agree(&mut conversation, &mut exchange, at).await?;

        self.finish(conversation, Some(exchange), at).await
    }

    async fn apply_begin_execution(
        &self,
        contact_id: ContactId,
        at: Timestamp,
    ) -> Result<(NegotiationSnapshot, ProfileHandle), BrokerError> {
        let conversation = self.active_conversation(contact_id).await?;
        ensure_phase(&conversation, NegotiationPhase::WaitingExecution, "begin execution")?;
        let mut exchange = self.require_exchange(&conversation).await?;

        let handle = self.ledger.begin_execution(&mut exchange, at).await?;
        let snapshot = self.finish(conversation, Some(exchange), at).await?;
        Ok((snapshot, handle))
    }

    async fn apply_execution(
        &self,
        contact_id: ContactId,
        report: ExecutionReport,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let mut conversation = self.active_conversation(contact_id).await?;
        ensure_fresh(&conversation, report.at)?;
        ensure_linked(&conversation, report.exchange_id)?;
        ensure_phase(&conversation, NegotiationPhase::WaitingExecution, "report execution")?;
        let mut exchange = self.require_exchange(&conversation).await?;

        let status = self
            .ledger
            .record_execution(&mut exchange, report.results, report.ban_detected, report.at)
            .await?;

        if status == ExchangeStatus::MyTurnDone {
            let deadline = exchange.timeout_at();
            enter(
                &mut conversation,
                NegotiationPhase::VerifyingCompletion,
                report.at,
                deadline,
            )?;
            self.finish(conversation, Some(exchange), report.at).await
        } else {
            self.end(contact_id, exchange).await
        }
    }

    async fn apply_verification(
        &self,
        contact_id: ContactId,
        report: VerificationReport,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let conversation = self.active_conversation(contact_id).await?;
        ensure_fresh(&conversation, report.at)?;
        ensure_linked(&conversation, report.exchange_id)?;
        ensure_phase(
            &conversation,
            NegotiationPhase::VerifyingCompletion,
            "verify the partner",
        )?;
        let mut exchange = self.require_exchange(&conversation).await?;

        let status = self
            .ledger
            .record_verification(&mut exchange, report.results, report.impossible, report.at)
            .await?;

        match status {
            ExchangeStatus::Completed => {
                self.contacts
                    .mark_active_saved(contact_id, report.at)
                    .await?;
                self.end(contact_id, exchange).await
            }
            status if status.is_failure() => self.end(contact_id, exchange).await,
            _ => self.finish(conversation, Some(exchange), report.at).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Agrees once both sides propose the same terms.
    async fn try_agree(
        &self,
        conversation: &mut Conversation,
        exchange: &mut Exchange,
        at: Timestamp,
    ) -> Result<bool, BrokerError> {
        if exchange.status() != ExchangeStatus::Negotiating || !exchange.proposals_match() {
            return Ok(false);
        }
        if conversation.phase() == NegotiationPhase::WaitingResponse {
            let deadline = at.plus(self.policy.negotiation_timeout);
            enter(conversation, NegotiationPhase::NegotiatingTerms, at, deadline)?;
        }

        self.ledger.agree(exchange, at).await?;
        enter(
            conversation,
            NegotiationPhase::WaitingExecution,
            at,
            exchange.timeout_at(),
        )?;
        Ok(true)
    }

    async fn start_conversation(
        &self,
        contact_id: ContactId,
        at: Timestamp,
    ) -> Result<Conversation, BrokerError> {
        let conversation = Conversation::start(contact_id, at, at.plus(self.policy.response_timeout));
        match self.conversations.insert(&conversation).await {
            Ok(()) => {}
            Err(err) if err.code == ErrorCode::ConversationExists => {
                return Err(BrokerError::invalid_transition(err.message));
            }
            Err(err) => return Err(err.into()),
        }
        debug!(contact_id = %contact_id, "Conversation started");
        Ok(conversation)
    }

    async fn open_exchange(
        &self,
        conversation: &mut Conversation,
        initiator: Party,
        at: Timestamp,
    ) -> Result<Exchange, BrokerError> {
        let exchange = self
            .ledger
            .open(conversation.contact_id(), initiator, conversation.expires_at(), at)
            .await?;
        conversation.link_exchange(exchange.id())?;
        Ok(exchange)
    }

    /// Persists the conversation after an applied event.
    async fn finish(
        &self,
        mut conversation: Conversation,
        mut exchange: Option<Exchange>,
        at: Timestamp,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        if let Some(current) = exchange.as_mut() {
            if !current.status().is_agreed() && !current.is_closed() {
                self.ledger
                    .sync_deadline(current, conversation.expires_at())
                    .await?;
            }
        }
        conversation.touch(at);
        self.conversations.update(&conversation).await?;
        Ok(NegotiationSnapshot {
            conversation: Some(conversation),
            exchange,
        })
    }

    /// Clears the conversation once its exchange reached a terminal status.
    async fn end(
        &self,
        contact_id: ContactId,
        exchange: Exchange,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        self.conversations.delete(contact_id).await?;
        debug!(contact_id = %contact_id, status = %exchange.status(), "Conversation ended");
        Ok(NegotiationSnapshot {
            conversation: None,
            exchange: Some(exchange),
        })
    }

    async fn replied_since(&self, contact_id: ContactId, since: Timestamp) -> Result<bool, BrokerError> {
        let contact = self.contacts.get(contact_id).await?;
        Ok(contact
            .last_response_at()
            .is_some_and(|at| !at.is_before(&since)))
    }

    /// Drops the contact's conversation, cancelling its live exchange.
    async fn cancel_active(&self, contact_id: ContactId, at: Timestamp) -> Result<(), BrokerError> {
        if let Some(conversation) = self.conversations.find_by_contact(contact_id).await? {
            if let Some(mut exchange) = self.linked_exchange(&conversation).await? {
                self.ledger.cancel(&mut exchange, at).await?;
            }
            self.conversations.delete(contact_id).await?;
            debug!(contact_id = %contact_id, "Active conversation cancelled");
        }
        Ok(())
    }

    async fn active_conversation(&self, contact_id: ContactId) -> Result<Conversation, BrokerError> {
        self.ensure_not_blocked(contact_id).await?;
        self.conversations
            .find_by_contact(contact_id)
            .await?
            .ok_or_else(|| {
                BrokerError::invalid_transition(format!(
                    "contact {} has no active conversation",
                    contact_id
                ))
            })
    }

    async fn linked_exchange(
        &self,
        conversation: &Conversation,
    ) -> Result<Option<Exchange>, BrokerError> {
        match conversation.exchange_id() {
            Some(id) => Ok(Some(self.ledger.get(id).await?)),
            None => Ok(None),
        }
    }

    async fn require_exchange(&self, conversation: &Conversation) -> Result<Exchange, BrokerError> {
        self.linked_exchange(conversation).await?.ok_or_else(|| {
            BrokerError::invalid_transition(format!(
                "conversation for contact {} has no exchange",
                conversation.contact_id()
            ))
        })
    }

    async fn ensure_not_blocked(&self, contact_id: ContactId) -> Result<(), BrokerError> {
        if self.contacts.get(contact_id).await?.is_blocked() {
            return Err(BrokerError::ContactBlocked(contact_id));
        }
        Ok(())
    }

    /// Records rejected events in the audit log before handing the error back.
    async fn audited<T>(
        &self,
        contact_id: ContactId,
        at: Timestamp,
        result: Result<T, BrokerError>,
    ) -> Result<T, BrokerError> {
        let err = match result {
            Err(err) if err.is_audited() => err,
            other => return other,
        };

        let kind = match &err {
            BrokerError::StaleEvent { .. } => AuditKind::StaleEvent,
            _ => AuditKind::InvalidTransition,
        };
        warn!(contact_id = %contact_id, kind = %kind, error = %err, "Event discarded");
        let entry = AuditEntry::for_contact(kind, contact_id, err.to_string(), at);
        if let Err(audit_err) = self.audit.record(entry).await {
            warn!(contact_id = %contact_id, error = %audit_err, "Failed to write audit entry");
        }
        Err(err)
    }
}

fn enter(
    conversation: &mut Conversation,
    phase: NegotiationPhase,
    at: Timestamp,
    deadline: Timestamp,
) -> Result<(), BrokerError> {
    conversation
        .enter(phase, at, deadline)
        .map_err(|e| BrokerError::invalid_transition(e.to_string()))
}

fn ensure_fresh(conversation: &Conversation, at: Timestamp) -> Result<(), BrokerError> {
    if conversation.is_stale(at) {
        return Err(BrokerError::StaleEvent {
            contact_id: conversation.contact_id(),
            event_at: at,
            last_applied_at: conversation.last_event_at(),
        });
    }
    Ok(())
}

fn ensure_phase(
    conversation: &Conversation,
    expected: NegotiationPhase,
    action: &str,
) -> Result<(), BrokerError> {
    if conversation.phase() != expected {
        return Err(BrokerError::invalid_transition(format!(
            "cannot {} while {}",
            action,
            conversation.phase()
        )));
    }
    Ok(())
}

fn ensure_linked(conversation: &Conversation, exchange_id: ExchangeId) -> Result<(), BrokerError> {
    if conversation.exchange_id() != Some(exchange_id) {
        return Err(BrokerError::invalid_transition(format!(
            "exchange {} is not the active exchange for contact {}",
            exchange_id,
            conversation.contact_id()
        )));
    }
    Ok(())
}
