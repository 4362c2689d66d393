//! ExchangeBroker - wires the services together and exposes the intake
//! operations used by the HTTP layer and the collaborators.

use std::sync::Arc;
use tracing::debug;

use super::contact_registry::ContactRegistry;
use super::conversation_machine::{
    ConversationStateMachine, ExecutionReport, InboundMessage, NegotiationPolicy,
    NegotiationSnapshot, Outreach, VerificationReport,
};
use super::errors::BrokerError;
use super::exchange_ledger::ExchangeLedger;
use super::profile_pool::{AutomationProfilePool, ProfileHandle};
use super::timeout_sweeper::{SweepReport, TimeoutSweeper};
use crate::adapters::alerting::TracingAlertSink;
use crate::adapters::memory::{
    InMemoryAuditLog, InMemoryContactRepository, InMemoryConversationRepository,
    InMemoryExchangeRepository, InMemoryProfileRepository,
};
use crate::adapters::InMemoryEventBus;
use crate::config::{AppConfig, NegotiationConfig};
use crate::domain::contact::{Contact, ContactIdentity, DiscoveryInfo, Recomputed, RelaunchCriteria};
use crate::domain::exchange::{Exchange, Terms};
use crate::domain::foundation::{ContactId, ExchangeId, LeaseId, ProfileId, Timestamp};
use crate::domain::profile::AutomationProfile;
use crate::ports::{
    AlertSink, AuditLog, ContactRepository, ConversationRepository, EventPublisher,
    ExchangeRepository, ProfileRepository,
};

/// Most relaunch candidates returned by one query.
pub const DEFAULT_RELAUNCH_LIMIT: u32 = 100;

/// Infrastructure the broker runs on.
#[derive(Clone)]
pub struct BrokerPorts {
    pub contacts: Arc<dyn ContactRepository>,
    pub exchanges: Arc<dyn ExchangeRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub alerts: Arc<dyn AlertSink>,
    pub events: Arc<dyn EventPublisher>,
}

impl BrokerPorts {
    /// Process-local adapters for every port.
    pub fn in_memory() -> Self {
        Self {
            contacts: Arc::new(InMemoryContactRepository::new()),
            exchanges: Arc::new(InMemoryExchangeRepository::new()),
            conversations: Arc::new(InMemoryConversationRepository::new()),
            profiles: Arc::new(InMemoryProfileRepository::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
            alerts: Arc::new(TracingAlertSink::new()),
            events: Arc::new(InMemoryEventBus::new()),
        }
    }
}

/// An offer event from the classifier.
#[derive(Debug, Clone)]
pub struct OfferEvent {
    pub platform: String,
    pub external_user_id: String,
    pub display_name: Option<String>,
    pub group_context: Option<String>,
    pub message_text: String,
    pub extracted_terms: Option<Terms>,
    pub video_urls: Vec<String>,
    pub at: Timestamp,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OfferOutcome {
    pub contact: Contact,
    pub negotiation: NegotiationSnapshot,
}

/// Relaunch query; unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelaunchQuery {
    pub min_score: Option<u8>,
    pub min_exchanges: Option<u32>,
    pub cooldown_days: Option<u32>,
    pub limit: Option<u32>,
}

pub struct ExchangeBroker {
    contacts: Arc<ContactRegistry>,
    ledger: Arc<ExchangeLedger>,
    pool: Arc<AutomationProfilePool>,
    machine: Arc<ConversationStateMachine>,
    sweeper: Arc<TimeoutSweeper>,
    negotiation: NegotiationConfig,
}

impl ExchangeBroker {
    pub fn new(ports: BrokerPorts, config: &AppConfig) -> Self {
        let contacts = Arc::new(ContactRegistry::new(
            ports.contacts,
            ports.events.clone(),
            ports.audit.clone(),
            config.negotiation.inactivity_window(),
        ));
        let pool = Arc::new(AutomationProfilePool::new(
            ports.profiles,
            ports.alerts,
            ports.audit.clone(),
            config.profiles.capacity_alert_threshold(),
            config.profiles.default_max_daily_actions,
        ));
        let ledger = Arc::new(ExchangeLedger::new(
            ports.exchanges.clone(),
            contacts.clone(),
            pool.clone(),
            ports.events,
            config.negotiation.negotiation_timeout(),
        ));
        let machine = Arc::new(ConversationStateMachine::new(
            ports.conversations.clone(),
            contacts.clone(),
            ledger.clone(),
            ports.audit,
            NegotiationPolicy::from_config(&config.negotiation),
        ));
        let sweeper = Arc::new(TimeoutSweeper::new(
            ports.conversations,
            ports.exchanges,
            machine.clone(),
            &config.sweeper,
        ));

        Self {
            contacts,
            ledger,
            pool,
            machine,
            sweeper,
            negotiation: config.negotiation.clone(),
        }
    }

    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(BrokerPorts::in_memory(), config)
    }

    pub fn contacts(&self) -> &Arc<ContactRegistry> {
        &self.contacts
    }

    pub fn ledger(&self) -> &Arc<ExchangeLedger> {
        &self.ledger
    }

    pub fn pool(&self) -> &Arc<AutomationProfilePool> {
        &self.pool
    }

    pub fn machine(&self) -> &Arc<ConversationStateMachine> {
        &self.machine
    }

    pub fn sweeper(&self) -> Arc<TimeoutSweeper> {
        Arc::clone(&self.sweeper)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Intake
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers the sender and applies the offer message.
    pub async fn handle_offer(&self, offer: OfferEvent) -> Result<OfferOutcome, BrokerError> {
        let identity = ContactIdentity::new(offer.platform, offer.external_user_id)?;
        let video_url = offer.video_urls.into_iter().next();
        let discovery = DiscoveryInfo {
            display_name: offer.display_name,
            group: offer.group_context,
            source_message: Some(offer.message_text.clone()),
            source_video_url: video_url.clone(),
        };

        let contact = self.contacts.upsert(identity, discovery, offer.at).await?;
        debug!(contact_id = %contact.id(), "Offer received");
        let negotiation = self
            .machine
            .handle_inbound_message(
                contact.id(),
                InboundMessage {
                    text: offer.message_text,
                    terms: offer.extracted_terms,
                    video_url,
                    at: offer.at,
                },
            )
            .await?;

        let contact = self.contacts.get(contact.id()).await?;
        Ok(OfferOutcome {
            contact,
            negotiation,
        })
    }

    pub async fn handle_execution_report(
        &self,
        report: ExecutionReport,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let contact_id = self.ledger.get(report.exchange_id).await?.contact_id();
        self.machine
            .handle_execution_report(contact_id, report)
            .await
    }

    pub async fn handle_verification(
        &self,
        report: VerificationReport,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        let contact_id = self.ledger.get(report.exchange_id).await?.contact_id();
        self.machine.handle_verification(contact_id, report).await
    }

    pub async fn start_outreach(
        &self,
        contact_id: ContactId,
        outreach: Outreach,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        self.machine.start_outreach(contact_id, outreach).await
    }

    pub async fn propose_terms(
        &self,
        contact_id: ContactId,
        terms: Terms,
        at: Timestamp,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        self.machine.propose_terms(contact_id, terms, at).await
    }

    pub async fn begin_execution(
        &self,
        contact_id: ContactId,
        at: Timestamp,
    ) -> Result<(NegotiationSnapshot, ProfileHandle), BrokerError> {
        self.machine.begin_execution(contact_id, at).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Contacts
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn contact(&self, contact_id: ContactId) -> Result<Contact, BrokerError> {
        self.contacts.get(contact_id).await
    }

    pub async fn negotiation(
        &self,
        contact_id: ContactId,
    ) -> Result<NegotiationSnapshot, BrokerError> {
        self.contacts.get(contact_id).await?;
        self.machine.snapshot(contact_id).await
    }

    pub async fn exchange(&self, exchange_id: ExchangeId) -> Result<Exchange, BrokerError> {
        self.ledger.get(exchange_id).await
    }

    pub async fn block_contact(
        &self,
        contact_id: ContactId,
        reason: &str,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        self.machine.block_contact(contact_id, reason, at).await
    }

    pub async fn unblock_contact(
        &self,
        contact_id: ContactId,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        self.machine.unblock_contact(contact_id, at).await
    }

    pub async fn flag_contact(
        &self,
        contact_id: ContactId,
        reason: &str,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        self.machine.flag_contact(contact_id, reason, at).await
    }

    pub async fn tag_contact(
        &self,
        contact_id: ContactId,
        tag: &str,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        self.machine.tag_contact(contact_id, tag, at).await
    }

    pub async fn untag_contact(
        &self,
        contact_id: ContactId,
        tag: &str,
        at: Timestamp,
    ) -> Result<Contact, BrokerError> {
        self.machine.untag_contact(contact_id, tag, at).await
    }

    pub async fn recompute_score(
        &self,
        contact_id: ContactId,
        now: Timestamp,
    ) -> Result<Recomputed, BrokerError> {
        self.machine.recompute_contact(contact_id, now).await
    }

    pub async fn relaunch_candidates(
        &self,
        query: RelaunchQuery,
        now: Timestamp,
    ) -> Result<Vec<Contact>, BrokerError> {
        let cooldown_days = query
            .cooldown_days
            .unwrap_or(self.negotiation.relaunch_cooldown_days);
        let criteria = RelaunchCriteria::new(
            query.min_score.unwrap_or(self.negotiation.relaunch_min_score),
            query
                .min_exchanges
                .unwrap_or(self.negotiation.relaunch_min_exchanges),
            chrono::Duration::days(i64::from(cooldown_days)),
            now,
        );
        self.contacts
            .relaunch_candidates(&criteria, query.limit.unwrap_or(DEFAULT_RELAUNCH_LIMIT))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Profiles
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn register_profile(
        &self,
        handle: &str,
        max_daily_actions: Option<u32>,
        at: Timestamp,
    ) -> Result<AutomationProfile, BrokerError> {
        self.pool.register(handle, max_daily_actions, at).await
    }

    pub async fn profile_health(
        &self,
        profile_id: ProfileId,
        healthy: bool,
        at: Timestamp,
    ) -> Result<AutomationProfile, BrokerError> {
        self.pool.health_check(profile_id, healthy, at).await
    }

    pub fn release_profile(&self, lease_id: LeaseId) -> bool {
        self.pool.release(lease_id)
    }

    pub async fn sweep(&self, now: Timestamp) -> Result<SweepReport, BrokerError> {
        self.sweeper.sweep_once(now).await
    }
}
