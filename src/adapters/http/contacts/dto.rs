//! Request and response bodies for contact endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::adapters::http::negotiation::NegotiationResponse;
use crate::application::ProfileHandle;
use crate::domain::contact::{Contact, ContactStatus};
use crate::domain::exchange::ActionKind;
use crate::domain::foundation::{ContactId, Timestamp};

/// Terms as they arrive on the wire, validated into `Terms` by the handler.
pub type TermsBody = BTreeMap<ActionKind, i64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactResponse {
    pub id: ContactId,
    pub platform: String,
    pub external_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub status: ContactStatus,
    pub reliability_score: u8,
    pub total_exchanges: u32,
    pub successful_exchanges: u32,
    pub failed_exchanges: u32,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    pub last_exchange_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<&Contact> for ContactResponse {
    fn from(contact: &Contact) -> Self {
        let tally = contact.tally();
        Self {
            id: contact.id(),
            platform: contact.identity().platform().to_string(),
            external_user_id: contact.identity().external_user_id().to_string(),
            display_name: contact.display_name().map(str::to_string),
            status: contact.status(),
            reliability_score: contact.reliability_score().value(),
            total_exchanges: tally.total,
            successful_exchanges: tally.successful,
            failed_exchanges: tally.failed,
            tags: contact.tags().iter().cloned().collect(),
            flag_reason: contact.flag_reason().map(str::to_string),
            block_reason: contact.block_reason().map(str::to_string),
            last_exchange_at: contact.last_exchange_at(),
            created_at: contact.created_at(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutreachRequest {
    pub terms: TermsBody,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalRequest {
    pub terms: TermsBody,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimedRequest {
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRequest {
    pub tag: String,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStartedResponse {
    pub profile: ProfileHandle,
    pub negotiation: NegotiationResponse,
}

/// Query string for relaunch candidates; unset fields use the configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelaunchParams {
    pub min_score: Option<u8>,
    pub min_exchanges: Option<u32>,
    pub cooldown_days: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelaunchCandidatesResponse {
    pub candidates: Vec<ContactResponse>,
}
