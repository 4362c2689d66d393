//! Contact domain events.

use serde::{Deserialize, Serialize};

use super::status::ContactStatus;
use crate::domain::foundation::{domain_event, ContactId, EventId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDiscovered {
    pub event_id: EventId,
    pub contact_id: ContactId,
    pub platform: String,
    pub external_user_id: String,
    pub discovered_at: Timestamp,
}

domain_event!(
    ContactDiscovered,
    event_type = "contact.discovered.v1",
    aggregate_id = contact_id,
    aggregate_type = "Contact",
    occurred_at = discovered_at,
    event_id = event_id
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactBlocked {
    pub event_id: EventId,
    pub contact_id: ContactId,
    pub reason: String,
    pub blocked_at: Timestamp,
}

domain_event!(
    ContactBlocked,
    event_type = "contact.blocked.v1",
    aggregate_id = contact_id,
    aggregate_type = "Contact",
    occurred_at = blocked_at,
    event_id = event_id
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUnblocked {
    pub event_id: EventId,
    pub contact_id: ContactId,
    pub restored_status: ContactStatus,
    pub unblocked_at: Timestamp,
}

domain_event!(
    ContactUnblocked,
    event_type = "contact.unblocked.v1",
    aggregate_id = contact_id,
    aggregate_type = "Contact",
    occurred_at = unblocked_at,
    event_id = event_id
);
