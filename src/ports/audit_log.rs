//! Audit log port.
//!
//! Rejected and discarded events never change state, so the audit log is
//! the only trace they leave.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{ContactId, DomainError, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    InvalidTransition,
    StaleEvent,
    Blocked,
    Unblocked,
    CapacityExhausted,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::InvalidTransition => "invalid_transition",
            AuditKind::StaleEvent => "stale_event",
            AuditKind::Blocked => "blocked",
            AuditKind::Unblocked => "unblocked",
            AuditKind::CapacityExhausted => "capacity_exhausted",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub contact_id: Option<ContactId>,
    pub detail: String,
    pub recorded_at: Timestamp,
}

impl AuditEntry {
    pub fn for_contact(
        kind: AuditKind,
        contact_id: ContactId,
        detail: impl Into<String>,
        at: Timestamp,
    ) -> Self {
        Self {
            kind,
            contact_id: Some(contact_id),
            detail: detail.into(),
            recorded_at: at,
        }
    }

    pub fn system(kind: AuditKind, detail: impl Into<String>, at: Timestamp) -> Self {
        Self {
            kind,
            contact_id: None,
            detail: detail.into(),
            recorded_at: at,
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), DomainError>;

    /// Entries for one contact, oldest first.
    async fn entries_for(&self, contact_id: ContactId) -> Result<Vec<AuditEntry>, DomainError>;
}
