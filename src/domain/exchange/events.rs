//! Exchange domain events.

use serde::{Deserialize, Serialize};

use super::status::ExchangeStatus;
use super::terms::Terms;
use crate::domain::foundation::{domain_event, ContactId, EventId, ExchangeId, Timestamp};

/// Published when both sides lock in identical terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeAgreed {
    pub event_id: EventId,
    pub exchange_id: ExchangeId,
    pub contact_id: ContactId,
    pub terms: Terms,
    pub timeout_at: Timestamp,
    pub agreed_at: Timestamp,
}

domain_event!(
    ExchangeAgreed,
    event_type = "exchange.agreed.v1",
    aggregate_id = exchange_id,
    aggregate_type = "Exchange",
    occurred_at = agreed_at,
    event_id = event_id
);

/// Published when both sides' actions are verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeCompleted {
    pub event_id: EventId,
    pub exchange_id: ExchangeId,
    pub contact_id: ContactId,
    pub completed_at: Timestamp,
}

domain_event!(
    ExchangeCompleted,
    event_type = "exchange.completed.v1",
    aggregate_id = exchange_id,
    aggregate_type = "Exchange",
    occurred_at = completed_at,
    event_id = event_id
);

/// Published when an exchange ends in one of the failure statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeClosed {
    pub event_id: EventId,
    pub exchange_id: ExchangeId,
    pub contact_id: ContactId,
    pub status: ExchangeStatus,
    pub reason: Option<String>,
    pub closed_at: Timestamp,
}

domain_event!(
    ExchangeClosed,
    event_type = "exchange.closed.v1",
    aggregate_id = exchange_id,
    aggregate_type = "Exchange",
    occurred_at = closed_at,
    event_id = event_id
);
