//! Application layer - the stateful services of the broker.
//!
//! - `ContactRegistry` - contact records and reliability scores
//! - `ExchangeLedger` - exchange status machine and outcome bookkeeping
//! - `ConversationStateMachine` - per-contact negotiation driver
//! - `AutomationProfilePool` - leased execution identities with daily quotas
//! - `TimeoutSweeper` - periodic expiry of overdue negotiations
//! - `ExchangeBroker` - facade wiring all of the above

mod broker;
mod contact_registry;
mod conversation_machine;
mod errors;
mod exchange_ledger;
mod locks;
mod profile_pool;
mod timeout_sweeper;

pub use broker::{
    BrokerPorts, ExchangeBroker, OfferEvent, OfferOutcome, RelaunchQuery, DEFAULT_RELAUNCH_LIMIT,
};
pub use contact_registry::ContactRegistry;
pub use conversation_machine::{
    ConversationStateMachine, ExecutionReport, Expiry, InboundMessage, NegotiationPolicy,
    NegotiationSnapshot, Outreach, VerificationReport,
};
pub use errors::BrokerError;
pub use exchange_ledger::{ExchangeLedger, CANCELLED_REASON, VERIFICATION_IMPOSSIBLE_REASON};
pub use locks::{KeyGuard, KeyedLocks};
pub use profile_pool::{AutomationProfilePool, ProfileHandle};
pub use timeout_sweeper::{SweepReport, TimeoutSweeper};

use serde::Serialize;

use crate::domain::foundation::{DomainError, DomainEvent, ErrorCode, EventEnvelope};
use crate::ports::EventPublisher;

/// Wraps `event` in an envelope and publishes it.
async fn publish<E>(publisher: &dyn EventPublisher, event: &E) -> Result<(), BrokerError>
where
    E: DomainEvent + Serialize,
{
    let envelope = EventEnvelope::from_event(event).map_err(|e| {
        BrokerError::Infrastructure(DomainError::new(
            ErrorCode::InternalError,
            format!("failed to serialize {}: {}", event.event_type(), e),
        ))
    })?;
    publisher.publish(envelope).await?;
    Ok(())
}
