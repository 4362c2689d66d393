//! ExchangeLedger - drives exchanges through their status machine.
//!
//! Every method expects the caller to hold the owning contact's section.
//! Business outcomes (`failed`, `no_response`, `partner_did_not_complete`)
//! are recorded on the contact and announced as `exchange.closed.v1`.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

use super::contact_registry::ContactRegistry;
use super::errors::BrokerError;
use super::profile_pool::{AutomationProfilePool, ProfileHandle};
use super::publish;
use crate::domain::exchange::{
    ActionResults, Direction, Exchange, ExchangeAgreed, ExchangeClosed, ExchangeCompleted, ExchangeError,
    ExchangeStatus, Party, Terms, TranscriptEntry,
};
use crate::domain::foundation::{ContactId, EventId, ExchangeId, StateMachine, Timestamp};
use crate::domain::profile::UsageReport;
use crate::ports::{EventPublisher, ExchangeRepository};

/// Reason recorded when an exchange is force-closed by blocking its contact.
pub const CANCELLED_REASON: &str = "cancelled";

/// Reason recorded when verification can never succeed.
pub const VERIFICATION_IMPOSSIBLE_REASON: &str = "partner actions cannot be verified";

pub struct ExchangeLedger {
    repository: Arc<dyn ExchangeRepository>,
    contacts: Arc<ContactRegistry>,
    pool: Arc<AutomationProfilePool>,
    event_publisher: Arc<dyn EventPublisher>,
    completion_window: Duration,
}

impl ExchangeLedger {
    pub fn new(
        repository: Arc<dyn ExchangeRepository>,
        contacts: Arc<ContactRegistry>,
        pool: Arc<AutomationProfilePool>,
        event_publisher: Arc<dyn EventPublisher>,
        completion_window: Duration,
    ) -> Self {
        Self {
            repository,
            contacts,
            pool,
            event_publisher,
            completion_window,
        }
    }

    /// Opens an exchange with `contact_id`. Blocked contacts are rejected.
    pub async fn open(
        &self,
        contact_id: ContactId,
        initiator: Party,
        deadline: Timestamp,
        at: Timestamp,
    ) -> Result<Exchange, BrokerError> {
        let contact = self.contacts.get(contact_id).await?;
        if contact.is_blocked() {
            return Err(BrokerError::ContactBlocked(contact_id));
        }

        let exchange = Exchange::open(contact_id, initiator, deadline, at);
        self.repository.insert(&exchange).await?;
        debug!(
            exchange_id = %exchange.id(),
            contact_id = %contact_id,
            initiator = %initiator,
            "Exchange opened"
        );
        Ok(exchange)
    }

    pub async fn get(&self, id: ExchangeId) -> Result<Exchange, BrokerError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| BrokerError::not_found("exchange", id))
    }

    /// Exchanges with a contact, newest first.
    pub async fn for_contact(&self, contact_id: ContactId) -> Result<Vec<Exchange>, BrokerError> {
        Ok(self.repository.find_by_contact(contact_id).await?)
    }

    /// Appends a message to the transcript and notes any shared video.
    pub async fn record_message(
        &self,
        exchange: &mut Exchange,
        entry: TranscriptEntry,
        video_url: Option<&str>,
    ) -> Result<(), BrokerError> {
        if let Some(url) = video_url {
            let party = match entry.direction {
                Direction::Inbound => Party::Them,
                Direction::Outbound => Party::Us,
            };
            exchange.attach_video(party, url);
        }
        exchange.record_message(entry);
        self.repository.update(exchange).await?;
        Ok(())
    }

    /// Records a proposal from one side and logs it in the transcript.
    pub async fn propose(
        &self,
        exchange: &mut Exchange,
        party: Party,
        terms: Terms,
        at: Timestamp,
    ) -> Result<(), BrokerError> {
        exchange.propose(party, terms.clone(), at)?;
        if party == Party::Us {
            exchange.record_message(TranscriptEntry::outbound(
                format!("proposed {}", terms),
                Some(terms),
                at,
            ));
        }
        self.repository.update(exchange).await?;
        Ok(())
    }

    /// Locks in matching proposals and starts the completion window.
    pub async fn agree(&self, exchange: &mut Exchange, at: Timestamp) -> Result<Terms, BrokerError> {
        let terms = exchange.agree(at, self.completion_window)?.clone();
        self.repository.update(exchange).await?;
        self.contacts
            .learn_terms(exchange.contact_id(), terms.clone())
            .await?;

        info!(
            exchange_id = %exchange.id(),
            contact_id = %exchange.contact_id(),
            terms = %terms,
            "Exchange agreed"
        );
        publish(
            self.event_publisher.as_ref(),
            &ExchangeAgreed {
                event_id: EventId::new(),
                exchange_id: exchange.id(),
                contact_id: exchange.contact_id(),
                terms: terms.clone(),
                timeout_at: exchange.timeout_at(),
                agreed_at: at,
            },
        )
        .await?;
        Ok(terms)
    }

    /// Keeps a negotiating exchange's deadline in step with its conversation.
    pub async fn sync_deadline(
        &self,
        exchange: &mut Exchange,
        deadline: Timestamp,
    ) -> Result<(), BrokerError> {
        if exchange.timeout_at() == deadline {
            return Ok(());
        }
        exchange.extend_deadline(deadline)?;
        self.repository.update(exchange).await?;
        Ok(())
    }

    /// Leases an automation profile to perform our side.
    pub async fn begin_execution(
        &self,
        exchange: &mut Exchange,
        at: Timestamp,
    ) -> Result<ProfileHandle, BrokerError> {
        if exchange.status() != ExchangeStatus::Agreed || exchange.lease().is_some() {
            return Err(
                ExchangeError::invalid(exchange.id(), exchange.status(), "begin execution").into(),
            );
        }

        let handle = self.pool.acquire(at).await?;
        if let Err(err) = exchange.attach_profile(handle.profile_id, handle.lease_id, at) {
            self.pool.release(handle.lease_id);
            return Err(err.into());
        }
        if let Err(err) = self.repository.update(exchange).await {
            self.pool.release(handle.lease_id);
            return Err(err.into());
        }

        debug!(
            exchange_id = %exchange.id(),
            profile_id = %handle.profile_id,
            "Execution started"
        );
        Ok(handle)
    }

    /// Records our execution report and charges the leased profile.
    pub async fn record_execution(
        &self,
        exchange: &mut Exchange,
        results: ActionResults,
        ban_detected: bool,
        at: Timestamp,
    ) -> Result<ExchangeStatus, BrokerError> {
        let status = exchange.record_execution(results, at)?;
        self.repository.update(exchange).await?;

        if let Some((profile_id, lease_id)) = exchange.lease() {
            let report = UsageReport {
                success: status == ExchangeStatus::MyTurnDone,
                ban_detected,
            };
            self.pool
                .record_use(profile_id, Some(lease_id), report, at)
                .await?;
        }

        if status == ExchangeStatus::Failed {
            self.settle(exchange, at).await?;
        } else {
            debug!(exchange_id = %exchange.id(), "Our side executed");
        }
        Ok(status)
    }

    /// Records a verification of the partner's side.
    ///
    /// Complete results finish the exchange. `impossible` closes it as a
    /// partner failure; partial results leave it waiting for the deadline.
    pub async fn record_verification(
        &self,
        exchange: &mut Exchange,
        results: ActionResults,
        impossible: bool,
        at: Timestamp,
    ) -> Result<ExchangeStatus, BrokerError> {
        if impossible {
            if exchange.status() != ExchangeStatus::MyTurnDone {
                return Err(ExchangeError::invalid(
                    exchange.id(),
                    exchange.status(),
                    "verify partner actions",
                )
                .into());
            }
            exchange.mark_partner_failed(VERIFICATION_IMPOSSIBLE_REASON, at)?;
            self.repository.update(exchange).await?;
            self.settle(exchange, at).await?;
            return Ok(exchange.status());
        }

        let status = exchange.record_verification(results, at)?;
        if status != ExchangeStatus::TheirTurnDone {
            self.repository.update(exchange).await?;
            debug!(exchange_id = %exchange.id(), "Partial verification recorded");
            return Ok(status);
        }

        exchange.complete(at)?;
        self.repository.update(exchange).await?;
        self.contacts
            .record_outcome(exchange.contact_id(), ExchangeStatus::Completed, at)
            .await?;

        info!(
            exchange_id = %exchange.id(),
            contact_id = %exchange.contact_id(),
            "Exchange completed"
        );
        publish(
            self.event_publisher.as_ref(),
            &ExchangeCompleted {
                event_id: EventId::new(),
                exchange_id: exchange.id(),
                contact_id: exchange.contact_id(),
                completed_at: at,
            },
        )
        .await?;
        Ok(ExchangeStatus::Completed)
    }

    /// Closes an exchange whose deadline passed.
    ///
    /// Returns `None` when it was already closed, so repeated sweeps
    /// settle each exchange exactly once.
    pub async fn time_out(
        &self,
        exchange: &mut Exchange,
        at: Timestamp,
    ) -> Result<Option<ExchangeStatus>, BrokerError> {
        if exchange.status().is_terminal() {
            return Ok(None);
        }
        let outcome = exchange.time_out(at)?;
        self.repository.update(exchange).await?;
        self.settle(exchange, at).await?;
        Ok(Some(outcome))
    }

    /// Force-closes an open exchange as `failed` without counting it
    /// against the contact.
    pub async fn cancel(
        &self,
        exchange: &mut Exchange,
        at: Timestamp,
    ) -> Result<Option<ExchangeStatus>, BrokerError> {
        if exchange.status().is_terminal() {
            return Ok(None);
        }
        exchange.fail(CANCELLED_REASON, at)?;
        self.repository.update(exchange).await?;
        self.release_lease(exchange);
        self.announce_closed(exchange, at).await?;
        Ok(Some(exchange.status()))
    }

    /// Counts a failure outcome on the contact and announces it.
    async fn settle(&self, exchange: &Exchange, at: Timestamp) -> Result<(), BrokerError> {
        self.release_lease(exchange);
        self.contacts
            .record_outcome(exchange.contact_id(), exchange.status(), at)
            .await?;
        self.announce_closed(exchange, at).await
    }

    async fn announce_closed(&self, exchange: &Exchange, at: Timestamp) -> Result<(), BrokerError> {
        info!(
            exchange_id = %exchange.id(),
            contact_id = %exchange.contact_id(),
            status = %exchange.status(),
            reason = exchange.failure_reason().unwrap_or_default(),
            "Exchange closed"
        );
        publish(
            self.event_publisher.as_ref(),
            &ExchangeClosed {
                event_id: EventId::new(),
                exchange_id: exchange.id(),
                contact_id: exchange.contact_id(),
                status: exchange.status(),
                reason: exchange.failure_reason().map(str::to_string),
                closed_at: at,
            },
        )
        .await
    }

    /// Returns an unused lease to the pool.
    fn release_lease(&self, exchange: &Exchange) {
        if let Some((_, lease_id)) = exchange.lease() {
            self.pool.release(lease_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::alerting::TracingAlertSink;
    use crate::adapters::memory::{
        InMemoryAuditLog, InMemoryContactRepository, InMemoryExchangeRepository,
        InMemoryProfileRepository,
    };
    use crate::adapters::InMemoryEventBus;
    use crate::domain::contact::{ContactIdentity, DiscoveryInfo};
    use crate::domain::exchange::{ActionKind, ActionOutcome};

    struct Fixture {
        ledger: ExchangeLedger,
        contacts: Arc<ContactRegistry>,
        pool: Arc<AutomationProfilePool>,
        bus: Arc<InMemoryEventBus>,
        contact_id: ContactId,
    }

    async fn fixture() -> Fixture {
        let bus = Arc::new(InMemoryEventBus::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let contacts = Arc::new(ContactRegistry::new(
            Arc::new(InMemoryContactRepository::new()),
            bus.clone(),
            audit.clone(),
            Duration::days(14),
        ));
        let pool = Arc::new(AutomationProfilePool::new(
            Arc::new(InMemoryProfileRepository::new()),
            Arc::new(TracingAlertSink::new()),
            audit,
            Duration::minutes(15),
            50,
        ));
        let ledger = ExchangeLedger::new(
            Arc::new(InMemoryExchangeRepository::new()),
            contacts.clone(),
            pool.clone(),
            bus.clone(),
            Duration::hours(24),
        );
        let contact_id = contacts
            .upsert(
                ContactIdentity::new("youtube", "UC123").unwrap(),
                DiscoveryInfo::default(),
                t(0),
            )
            .await
            .unwrap()
            .id();
        Fixture {
            ledger,
            contacts,
            pool,
            bus,
            contact_id,
        }
    }

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs)
    }

    fn likes(n: i64) -> Terms {
        Terms::new([(ActionKind::Like, n)]).unwrap()
    }

    fn liked(done: bool) -> ActionResults {
        ActionResults::new([(ActionKind::Like, ActionOutcome::Flag(done))])
    }

    async fn agreed(f: &Fixture) -> Exchange {
        let mut ex = f
            .ledger
            .open(f.contact_id, Party::Them, t(1000), t(1))
            .await
            .unwrap();
        f.ledger.propose(&mut ex, Party::Them, likes(5), t(2)).await.unwrap();
        f.ledger.propose(&mut ex, Party::Us, likes(5), t(3)).await.unwrap();
        f.ledger.agree(&mut ex, t(4)).await.unwrap();
        ex
    }

    mod negotiation {
        use super::*;

        #[tokio::test]
        async fn blocked_contact_cannot_open_exchange() {
            let f = fixture().await;
            f.contacts.block(f.contact_id, "spam", t(1)).await.unwrap();

            let err = f
                .ledger
                .open(f.contact_id, Party::Us, t(100), t(2))
                .await
                .unwrap_err();
            assert!(matches!(err, BrokerError::ContactBlocked(_)));
        }

        #[tokio::test]
        async fn agreement_learns_terms_and_publishes() {
            let f = fixture().await;
            let ex = agreed(&f).await;

            assert_eq!(ex.status(), ExchangeStatus::Agreed);
            assert_eq!(ex.timeout_at(), t(4).plus(Duration::hours(24)));
            let contact = f.contacts.get(f.contact_id).await.unwrap();
            assert_eq!(contact.preferences().preferred_terms, Some(likes(5)));
            assert!(f.bus.has_event("exchange.agreed.v1"));
            assert_eq!(ex.transcript().len(), 1);
        }

        #[tokio::test]
        async fn mismatched_terms_cannot_agree() {
            let f = fixture().await;
            let mut ex = f
                .ledger
                .open(f.contact_id, Party::Them, t(1000), t(1))
                .await
                .unwrap();
            f.ledger.propose(&mut ex, Party::Them, likes(5), t(2)).await.unwrap();
            f.ledger.propose(&mut ex, Party::Us, likes(3), t(3)).await.unwrap();

            let err = f.ledger.agree(&mut ex, t(4)).await.unwrap_err();
            assert!(matches!(err, BrokerError::InvalidTransition(_)));
        }
    }

    mod execution {
        use super::*;

        #[tokio::test]
        async fn execution_charges_the_leased_profile() {
            let f = fixture().await;
            let profile = f.pool.register("bot", Some(5), t(0)).await.unwrap();
            let mut ex = agreed(&f).await;

            let handle = f.ledger.begin_execution(&mut ex, t(5)).await.unwrap();
            assert_eq!(handle.profile_id, profile.id());
            assert_eq!(f.pool.outstanding(profile.id()), 1);

            let status = f
                .ledger
                .record_execution(&mut ex, liked(true), false, t(6))
                .await
                .unwrap();

            assert_eq!(status, ExchangeStatus::MyTurnDone);
            assert_eq!(f.pool.outstanding(profile.id()), 0);
            assert_eq!(f.pool.get(profile.id()).await.unwrap().successful_uses(), 1);
        }

        #[tokio::test]
        async fn failed_execution_counts_toward_total_only() {
            let f = fixture().await;
            let mut ex = agreed(&f).await;

            let status = f
                .ledger
                .record_execution(&mut ex, liked(false), false, t(6))
                .await
                .unwrap();

            assert_eq!(status, ExchangeStatus::Failed);
            let tally = f.contacts.get(f.contact_id).await.unwrap().tally();
            assert_eq!((tally.total, tally.successful, tally.failed), (1, 0, 0));
            assert!(f.bus.has_event("exchange.closed.v1"));
        }

        #[tokio::test]
        async fn begin_execution_without_capacity_keeps_exchange_agreed() {
            let f = fixture().await;
            let mut ex = agreed(&f).await;

            let err = f.ledger.begin_execution(&mut ex, t(5)).await.unwrap_err();

            assert!(matches!(err, BrokerError::NoCapacityAvailable));
            assert_eq!(ex.lease(), None);
            assert_eq!(ex.status(), ExchangeStatus::Agreed);
        }
    }

    mod verification {
        use super::*;

        async fn executed(f: &Fixture) -> Exchange {
            let mut ex = agreed(f).await;
            f.ledger
                .record_execution(&mut ex, liked(true), false, t(6))
                .await
                .unwrap();
            ex
        }

        #[tokio::test]
        async fn complete_verification_finishes_exchange() {
            let f = fixture().await;
            let mut ex = executed(&f).await;

            let status = f
                .ledger
                .record_verification(&mut ex, liked(true), false, t(7))
                .await
                .unwrap();

            assert_eq!(status, ExchangeStatus::Completed);
            let contact = f.contacts.get(f.contact_id).await.unwrap();
            assert_eq!(contact.tally().successful, 1);
            assert_eq!(contact.reliability_score().value(), 75);
            assert!(f.bus.has_event("exchange.completed.v1"));
        }

        #[tokio::test]
        async fn partial_verification_keeps_waiting() {
            let f = fixture().await;
            let mut ex = executed(&f).await;

            let status = f
                .ledger
                .record_verification(&mut ex, ActionResults::default(), false, t(7))
                .await
                .unwrap();

            assert_eq!(status, ExchangeStatus::MyTurnDone);
        }

        #[tokio::test]
        async fn impossible_verification_is_partner_failure() {
            let f = fixture().await;
            let mut ex = executed(&f).await;

            let status = f
                .ledger
                .record_verification(&mut ex, ActionResults::default(), true, t(7))
                .await
                .unwrap();

            assert_eq!(status, ExchangeStatus::PartnerDidNotComplete);
            assert_eq!(f.contacts.get(f.contact_id).await.unwrap().tally().failed, 1);
        }
    }

    mod closing {
        use super::*;

        #[tokio::test]
        async fn timeout_settles_exactly_once() {
            let f = fixture().await;
            let mut ex = agreed(&f).await;
            let late = ex.timeout_at().plus_secs(1);

            let first = f.ledger.time_out(&mut ex, late).await.unwrap();
            let second = f.ledger.time_out(&mut ex, late).await.unwrap();

            assert_eq!(first, Some(ExchangeStatus::PartnerDidNotComplete));
            assert_eq!(second, None);
            assert_eq!(f.contacts.get(f.contact_id).await.unwrap().tally().failed, 1);
            assert_eq!(f.bus.events_of_type("exchange.closed.v1").len(), 1);
        }

        #[tokio::test]
        async fn timeout_before_agreement_is_not_counted() {
            let f = fixture().await;
            let mut ex = f
                .ledger
                .open(f.contact_id, Party::Us, t(100), t(1))
                .await
                .unwrap();

            let outcome = f.ledger.time_out(&mut ex, t(101)).await.unwrap();

            assert_eq!(outcome, Some(ExchangeStatus::NoResponse));
            assert_eq!(f.contacts.get(f.contact_id).await.unwrap().tally().total, 0);
        }

        #[tokio::test]
        async fn cancel_releases_lease_without_tally() {
            let f = fixture().await;
            let profile = f.pool.register("bot", Some(5), t(0)).await.unwrap();
            let mut ex = agreed(&f).await;
            f.ledger.begin_execution(&mut ex, t(5)).await.unwrap();

            let outcome = f.ledger.cancel(&mut ex, t(6)).await.unwrap();

            assert_eq!(outcome, Some(ExchangeStatus::Failed));
            assert_eq!(ex.failure_reason(), Some(CANCELLED_REASON));
            assert_eq!(f.pool.outstanding(profile.id()), 0);
            assert_eq!(f.contacts.get(f.contact_id).await.unwrap().tally().total, 0);
        }
    }
}
