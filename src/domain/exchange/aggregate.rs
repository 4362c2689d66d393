//! Exchange aggregate.
//!
//! One exchange is one negotiated reciprocal engagement with a contact. It
//! records both sides' proposals, the agreed terms, our execution, the
//! partner's verification and the transcript that led there.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ExchangeError;
use super::execution::{ActionResults, ExecutionRecord, VerificationRecord};
use super::status::ExchangeStatus;
use super::terms::Terms;
use super::transcript::TranscriptEntry;
use crate::domain::foundation::{
    ContactId, ExchangeId, LeaseId, ProfileId, StateMachine, Timestamp, ValidationError,
};

/// Reason recorded when an exchange times out.
pub const TIMEOUT_REASON: &str = "timed out";

/// Which side of the exchange did something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Us,
    Them,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Us => "us",
            Party::Them => "them",
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Party {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "us" => Ok(Party::Us),
            "them" => Ok(Party::Them),
            other => Err(ValidationError::invalid_format(
                "party",
                format!("unknown party '{}'", other),
            )),
        }
    }
}

/// Exchange aggregate.
///
/// # Invariants
///
/// - `terms` is set iff the status is agreed or later (or a failure after agreement)
/// - once agreed, `terms` never change and `timeout_at` is `agreed_at` plus the completion window
/// - terminal exchanges are never modified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    id: ExchangeId,
    contact_id: ContactId,
    initiator: Party,
    our_video_url: Option<String>,
    their_video_url: Option<String>,
    our_proposal: Option<Terms>,
    their_proposal: Option<Terms>,
    terms: Option<Terms>,
    status: ExchangeStatus,
    failure_reason: Option<String>,
    execution: Option<ExecutionRecord>,
    verification: Option<VerificationRecord>,
    transcript: Vec<TranscriptEntry>,
    initiated_at: Timestamp,
    agreed_at: Option<Timestamp>,
    closed_at: Option<Timestamp>,
    timeout_at: Timestamp,
    updated_at: Timestamp,
}

/// Persisted form of an [`Exchange`], used by repositories to rebuild it.
#[derive(Debug, Clone)]
pub struct ExchangeParts {
    pub id: ExchangeId,
    pub contact_id: ContactId,
    pub initiator: Party,
    pub our_video_url: Option<String>,
    pub their_video_url: Option<String>,
    pub our_proposal: Option<Terms>,
    pub their_proposal: Option<Terms>,
    pub terms: Option<Terms>,
    pub status: ExchangeStatus,
    pub failure_reason: Option<String>,
    pub execution: Option<ExecutionRecord>,
    pub verification: Option<VerificationRecord>,
    pub transcript: Vec<TranscriptEntry>,
    pub initiated_at: Timestamp,
    pub agreed_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub timeout_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Exchange {
    /// Opens a new exchange in `initiated` with a negotiation deadline.
    pub fn open(contact_id: ContactId, initiator: Party, deadline: Timestamp, at: Timestamp) -> Self {
        Self {
            id: ExchangeId::new(),
            contact_id,
            initiator,
            our_video_url: None,
            their_video_url: None,
            our_proposal: None,
            their_proposal: None,
            terms: None,
            status: ExchangeStatus::Initiated,
            failure_reason: None,
            execution: None,
            verification: None,
            transcript: Vec::new(),
            initiated_at: at,
            agreed_at: None,
            closed_at: None,
            timeout_at: deadline,
            updated_at: at,
        }
    }

    /// Reconstitute from persistence (no validation).
    pub fn reconstitute(parts: ExchangeParts) -> Self {
        Self {
            id: parts.id,
            contact_id: parts.contact_id,
            initiator: parts.initiator,
            our_video_url: parts.our_video_url,
            their_video_url: parts.their_video_url,
            our_proposal: parts.our_proposal,
            their_proposal: parts.their_proposal,
            terms: parts.terms,
            status: parts.status,
            failure_reason: parts.failure_reason,
            execution: parts.execution,
            verification: parts.verification,
            transcript: parts.transcript,
            initiated_at: parts.initiated_at,
            agreed_at: parts.agreed_at,
            closed_at: parts.closed_at,
            timeout_at: parts.timeout_at,
            updated_at: parts.updated_at,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn contact_id(&self) -> ContactId {
        self.contact_id
    }

    pub fn initiator(&self) -> Party {
        self.initiator
    }

    pub fn video_url(&self, party: Party) -> Option<&str> {
        match party {
            Party::Us => self.our_video_url.as_deref(),
            Party::Them => self.their_video_url.as_deref(),
        }
    }

    pub fn proposal(&self, party: Party) -> Option<&Terms> {
        match party {
            Party::Us => self.our_proposal.as_ref(),
            Party::Them => self.their_proposal.as_ref(),
        }
    }

    /// Agreed terms; `None` before agreement.
    pub fn terms(&self) -> Option<&Terms> {
        self.terms.as_ref()
    }

    pub fn status(&self) -> ExchangeStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn execution(&self) -> Option<&ExecutionRecord> {
        self.execution.as_ref()
    }

    pub fn verification(&self) -> Option<&VerificationRecord> {
        self.verification.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn initiated_at(&self) -> Timestamp {
        self.initiated_at
    }

    pub fn agreed_at(&self) -> Option<Timestamp> {
        self.agreed_at
    }

    pub fn closed_at(&self) -> Option<Timestamp> {
        self.closed_at
    }

    pub fn timeout_at(&self) -> Timestamp {
        self.timeout_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Still open and past its deadline.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        !self.is_closed() && self.timeout_at.is_before(&now)
    }

    /// Profile lease held for our execution, if any.
    pub fn lease(&self) -> Option<(ProfileId, LeaseId)> {
        self.execution
            .as_ref()
            .and_then(|e| e.profile_id.zip(e.lease_id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Negotiation
    // ─────────────────────────────────────────────────────────────────────────

    pub fn attach_video(&mut self, party: Party, url: impl Into<String>) {
        let url = Some(url.into());
        match party {
            Party::Us => self.our_video_url = url,
            Party::Them => self.their_video_url = url,
        }
    }

    /// Appends a negotiation message. Closed exchanges keep their transcript frozen.
    pub fn record_message(&mut self, entry: TranscriptEntry) {
        if self.is_closed() {
            return;
        }
        self.updated_at = entry.at;
        self.transcript.push(entry);
    }

    /// Records a proposal from one side.
    ///
    /// The first proposal from the side that did not initiate moves the
    /// exchange into `negotiating`.
    pub fn propose(&mut self, party: Party, terms: Terms, at: Timestamp) -> Result<(), ExchangeError> {
        if !matches!(
            self.status,
            ExchangeStatus::Initiated | ExchangeStatus::Negotiating
        ) {
            return Err(ExchangeError::invalid(self.id, self.status, "propose terms"));
        }

        match party {
            Party::Us => self.our_proposal = Some(terms),
            Party::Them => self.their_proposal = Some(terms),
        }
        if self.status == ExchangeStatus::Initiated && party != self.initiator {
            self.status = ExchangeStatus::Negotiating;
        }
        self.updated_at = at;
        Ok(())
    }

    /// Both sides currently propose identical terms.
    pub fn proposals_match(&self) -> bool {
        matches!((&self.our_proposal, &self.their_proposal), (Some(ours), Some(theirs)) if ours == theirs)
    }

    /// Locks in the matching proposals and starts the completion window.
    pub fn agree(&mut self, at: Timestamp, completion_window: Duration) -> Result<&Terms, ExchangeError> {
        if self.status != ExchangeStatus::Negotiating {
            return Err(ExchangeError::invalid(self.id, self.status, "agree"));
        }
        let agreed = match (&self.our_proposal, &self.their_proposal) {
            (Some(ours), Some(theirs)) if ours == theirs => theirs.clone(),
            _ => return Err(ExchangeError::TermsMismatch(self.id)),
        };

        self.status = ExchangeStatus::Agreed;
        self.agreed_at = Some(at);
        self.timeout_at = at.plus(completion_window);
        self.updated_at = at;
        Ok(self.terms.insert(agreed))
    }

    /// Moves the negotiation deadline. Only meaningful before agreement.
    pub fn extend_deadline(&mut self, deadline: Timestamp) -> Result<(), ExchangeError> {
        if self.status.is_agreed() || self.is_closed() {
            return Err(ExchangeError::invalid(self.id, self.status, "move the deadline"));
        }
        self.timeout_at = deadline;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution and verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Records which automation profile performs our side.
    pub fn attach_profile(
        &mut self,
        profile_id: ProfileId,
        lease_id: LeaseId,
        at: Timestamp,
    ) -> Result<(), ExchangeError> {
        if self.status != ExchangeStatus::Agreed || self.lease().is_some() {
            return Err(ExchangeError::invalid(self.id, self.status, "begin execution"));
        }
        self.execution = Some(ExecutionRecord::leased(profile_id, lease_id, at));
        self.updated_at = at;
        Ok(())
    }

    /// Records our execution report.
    ///
    /// Every agreed action must be reported. If any of them fell short the
    /// exchange fails; otherwise it moves to `my_turn_done`.
    pub fn record_execution(
        &mut self,
        results: ActionResults,
        at: Timestamp,
    ) -> Result<ExchangeStatus, ExchangeError> {
        if self.status != ExchangeStatus::Agreed {
            return Err(ExchangeError::invalid(self.id, self.status, "record our execution"));
        }
        let coverage = match &self.terms {
            Some(terms) => results.coverage(terms),
            None => return Err(ExchangeError::invalid(self.id, self.status, "record our execution")),
        };
        if !coverage.all_attempted() {
            return Err(ExchangeError::IncompleteReport {
                id: self.id,
                missing: coverage.missing,
            });
        }

        let record = self.execution.get_or_insert(ExecutionRecord {
            profile_id: None,
            lease_id: None,
            started_at: None,
            finished_at: None,
            results: ActionResults::default(),
        });
        record.results = results;
        record.finished_at = Some(at);

        if coverage.unmet.is_empty() {
            self.move_to(ExchangeStatus::MyTurnDone, at)?;
        } else {
            let failed: Vec<&str> = coverage.unmet.iter().map(|k| k.as_str()).collect();
            self.close(
                ExchangeStatus::Failed,
                format!("our execution failed: {}", failed.join(", ")),
                at,
            )?;
        }
        Ok(self.status)
    }

    /// Records a verification of the partner's side.
    ///
    /// Complete results move the exchange to `their_turn_done`; partial ones
    /// are stored and the exchange keeps waiting.
    pub fn record_verification(
        &mut self,
        results: ActionResults,
        at: Timestamp,
    ) -> Result<ExchangeStatus, ExchangeError> {
        if self.status != ExchangeStatus::MyTurnDone {
            return Err(ExchangeError::invalid(self.id, self.status, "verify partner actions"));
        }
        let complete = self
            .terms
            .as_ref()
            .map(|terms| results.coverage(terms).is_complete())
            .unwrap_or(false);

        self.verification = Some(VerificationRecord {
            verified_at: at,
            results,
            complete,
        });
        self.updated_at = at;
        if complete {
            self.move_to(ExchangeStatus::TheirTurnDone, at)?;
        }
        Ok(self.status)
    }

    /// Both sides verified.
    pub fn complete(&mut self, at: Timestamp) -> Result<(), ExchangeError> {
        if self.status != ExchangeStatus::TheirTurnDone {
            return Err(ExchangeError::invalid(self.id, self.status, "complete"));
        }
        self.move_to(ExchangeStatus::Completed, at)?;
        self.closed_at = Some(at);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Failure exits
    // ─────────────────────────────────────────────────────────────────────────

    pub fn fail(&mut self, reason: impl Into<String>, at: Timestamp) -> Result<(), ExchangeError> {
        self.close(ExchangeStatus::Failed, reason.into(), at)
    }

    pub fn mark_partner_failed(
        &mut self,
        reason: impl Into<String>,
        at: Timestamp,
    ) -> Result<(), ExchangeError> {
        self.close(ExchangeStatus::PartnerDidNotComplete, reason.into(), at)
    }

    /// Closes the exchange as timed out, regardless of `timeout_at`.
    ///
    /// Before agreement this is `no_response`, afterwards
    /// `partner_did_not_complete`.
    pub fn time_out(&mut self, at: Timestamp) -> Result<ExchangeStatus, ExchangeError> {
        let outcome = self.status.timeout_outcome();
        self.close(outcome, TIMEOUT_REASON.to_string(), at)?;
        Ok(outcome)
    }

    fn close(&mut self, target: ExchangeStatus, reason: String, at: Timestamp) -> Result<(), ExchangeError> {
        self.move_to(target, at)?;
        self.failure_reason = Some(reason);
        self.closed_at = Some(at);
        Ok(())
    }

    fn move_to(&mut self, target: ExchangeStatus, at: Timestamp) -> Result<(), ExchangeError> {
        if !self.status.can_transition_to(&target) {
            return Err(ExchangeError::invalid(self.id, self.status, target.as_str()));
        }
        self.status = target;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exchange::execution::ActionOutcome;
    use crate::domain::exchange::terms::ActionKind;

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs)
    }

    fn likes(n: i64) -> Terms {
        Terms::new([(ActionKind::Like, n)]).unwrap()
    }

    fn inbound_exchange() -> Exchange {
        Exchange::open(ContactId::new(), Party::Them, t(3600), t(0))
    }

    fn agreed_exchange() -> Exchange {
        let mut ex = inbound_exchange();
        ex.propose(Party::Them, likes(5), t(1)).unwrap();
        ex.propose(Party::Us, likes(5), t(2)).unwrap();
        ex.agree(t(3), Duration::hours(24)).unwrap();
        ex
    }

    fn liked() -> ActionResults {
        ActionResults::new([(ActionKind::Like, ActionOutcome::Flag(true))])
    }

    #[test]
    fn initiator_proposal_keeps_initiated() {
        let mut ex = inbound_exchange();
        ex.propose(Party::Them, likes(5), t(1)).unwrap();
        assert_eq!(ex.status(), ExchangeStatus::Initiated);
    }

    #[test]
    fn counter_proposal_starts_negotiation() {
        let mut ex = inbound_exchange();
        ex.propose(Party::Them, likes(5), t(1)).unwrap();
        ex.propose(Party::Us, likes(3), t(2)).unwrap();
        assert_eq!(ex.status(), ExchangeStatus::Negotiating);
        assert!(!ex.proposals_match());
    }

    #[test]
    fn agree_requires_matching_proposals() {
        let mut ex = inbound_exchange();
        ex.propose(Party::Them, likes(5), t(1)).unwrap();
        ex.propose(Party::Us, likes(3), t(2)).unwrap();
        assert_eq!(
            ex.agree(t(3), Duration::hours(24)).unwrap_err(),
            ExchangeError::TermsMismatch(ex.id())
        );
        assert!(ex.terms().is_none());
    }

    #[test]
    fn agreement_sets_terms_and_deadline() {
        let ex = agreed_exchange();
        assert_eq!(ex.status(), ExchangeStatus::Agreed);
        assert_eq!(ex.terms(), Some(&likes(5)));
        assert_eq!(ex.agreed_at(), Some(t(3)));
        assert_eq!(ex.timeout_at(), t(3).plus(Duration::hours(24)));
    }

    #[test]
    fn terms_are_immutable_after_agreement() {
        let mut ex = agreed_exchange();
        assert!(matches!(
            ex.propose(Party::Them, likes(9), t(4)),
            Err(ExchangeError::InvalidTransition { .. })
        ));
        assert_eq!(ex.terms(), Some(&likes(5)));
    }

    #[test]
    fn deadline_cannot_move_after_agreement() {
        let mut ex = agreed_exchange();
        assert!(ex.extend_deadline(t(99_999)).is_err());
    }

    #[test]
    fn successful_execution_moves_to_my_turn_done() {
        let mut ex = agreed_exchange();
        assert_eq!(
            ex.record_execution(liked(), t(10)).unwrap(),
            ExchangeStatus::MyTurnDone
        );
        assert_eq!(ex.execution().unwrap().finished_at, Some(t(10)));
    }

    #[test]
    fn failed_action_fails_exchange_with_reason() {
        let mut ex = agreed_exchange();
        let results = ActionResults::new([(ActionKind::Like, ActionOutcome::Flag(false))]);
        assert_eq!(ex.record_execution(results, t(10)).unwrap(), ExchangeStatus::Failed);
        assert_eq!(ex.failure_reason(), Some("our execution failed: like"));
        assert_eq!(ex.closed_at(), Some(t(10)));
    }

    #[test]
    fn execution_report_must_cover_all_actions() {
        let mut ex = agreed_exchange();
        let err = ex.record_execution(ActionResults::default(), t(10)).unwrap_err();
        assert!(matches!(err, ExchangeError::IncompleteReport { .. }));
        assert_eq!(ex.status(), ExchangeStatus::Agreed);
    }

    #[test]
    fn partial_verification_keeps_waiting() {
        let mut ex = agreed_exchange();
        ex.record_execution(liked(), t(10)).unwrap();
        let status = ex.record_verification(ActionResults::default(), t(11)).unwrap();
        assert_eq!(status, ExchangeStatus::MyTurnDone);
        assert!(!ex.verification().unwrap().complete);
    }

    #[test]
    fn full_verification_then_complete() {
        let mut ex = agreed_exchange();
        ex.record_execution(liked(), t(10)).unwrap();
        assert_eq!(
            ex.record_verification(liked(), t(11)).unwrap(),
            ExchangeStatus::TheirTurnDone
        );
        ex.complete(t(11)).unwrap();
        assert_eq!(ex.status(), ExchangeStatus::Completed);
        assert!(ex.is_closed());
    }

    #[test]
    fn timeout_before_agreement_is_no_response() {
        let mut ex = inbound_exchange();
        assert!(ex.is_overdue(t(3601)));
        assert_eq!(ex.time_out(t(3601)).unwrap(), ExchangeStatus::NoResponse);
        assert_eq!(ex.failure_reason(), Some(TIMEOUT_REASON));
    }

    #[test]
    fn timeout_after_agreement_is_partner_failure() {
        let mut ex = agreed_exchange();
        ex.record_execution(liked(), t(10)).unwrap();
        assert_eq!(
            ex.time_out(t(100_000)).unwrap(),
            ExchangeStatus::PartnerDidNotComplete
        );
    }

    #[test]
    fn closed_exchange_rejects_reentry() {
        let mut ex = inbound_exchange();
        ex.time_out(t(3601)).unwrap();
        assert_eq!(
            ex.time_out(t(3700)).unwrap_err(),
            ExchangeError::AlreadyClosed {
                id: ex.id(),
                status: ExchangeStatus::NoResponse
            }
        );
        assert!(!ex.is_overdue(t(9_999)));
    }

    #[test]
    fn profile_lease_is_recorded_once() {
        let mut ex = agreed_exchange();
        let profile = ProfileId::new();
        let lease = LeaseId::new();
        ex.attach_profile(profile, lease, t(5)).unwrap();
        assert_eq!(ex.lease(), Some((profile, lease)));
        assert!(ex.attach_profile(profile, LeaseId::new(), t(6)).is_err());
    }

    #[test]
    fn transcript_freezes_once_closed() {
        let mut ex = inbound_exchange();
        ex.record_message(TranscriptEntry::inbound("5 likes?", Some(likes(5)), t(1)));
        ex.fail("cancelled", t(2)).unwrap();
        ex.record_message(TranscriptEntry::inbound("hello?", None, t(3)));
        assert_eq!(ex.transcript().len(), 1);
    }
}
