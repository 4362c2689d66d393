//! Negotiation transcript.

use serde::{Deserialize, Serialize};

use super::terms::Terms;
use crate::domain::foundation::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One message exchanged while negotiating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub direction: Direction,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<Terms>,
    pub at: Timestamp,
}

impl TranscriptEntry {
    pub fn inbound(text: impl Into<String>, terms: Option<Terms>, at: Timestamp) -> Self {
        Self {
            direction: Direction::Inbound,
            text: text.into(),
            terms,
            at,
        }
    }

    pub fn outbound(text: impl Into<String>, terms: Option<Terms>, at: Timestamp) -> Self {
        Self {
            direction: Direction::Outbound,
            text: text.into(),
            terms,
            at,
        }
    }
}
