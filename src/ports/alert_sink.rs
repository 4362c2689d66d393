//! Operational alert port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// No automation profile has had capacity since `since`.
    CapacityExhausted {
        since: Timestamp,
        raised_at: Timestamp,
        profiles: usize,
    },
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: Alert) -> Result<(), DomainError>;
}
