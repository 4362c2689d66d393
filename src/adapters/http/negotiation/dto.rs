//! Request and response bodies for negotiation endpoints.

use serde::{Deserialize, Serialize};

use crate::adapters::http::contacts::{ContactResponse, TermsBody};
use crate::application::NegotiationSnapshot;
use crate::domain::conversation::{Conversation, NegotiationPhase};
use crate::domain::exchange::{
    ActionResults, Exchange, ExchangeStatus, Party, Terms, TranscriptEntry,
};
use crate::domain::foundation::{ContactId, ConversationId, ExchangeId, Timestamp};

#[derive(Debug, Clone, Deserialize)]
pub struct OfferRequest {
    pub platform: String,
    pub external_user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub group_context: Option<String>,
    pub message_text: String,
    #[serde(default)]
    pub extracted_terms: Option<TermsBody>,
    #[serde(default)]
    pub video_urls: Vec<String>,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReportRequest {
    #[serde(default)]
    pub results: ActionResults,
    #[serde(default)]
    pub ban_detected: bool,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationRequest {
    #[serde(default)]
    pub results: ActionResults,
    /// The partner's side can never be confirmed.
    #[serde(default)]
    pub impossible: bool,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub id: ConversationId,
    pub phase: NegotiationPhase,
    pub previous_phase: Option<NegotiationPhase>,
    pub exchange_id: Option<ExchangeId>,
    pub entered_at: Timestamp,
    pub expires_at: Timestamp,
    pub last_event_at: Timestamp,
}

impl From<&Conversation> for ConversationView {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id(),
            phase: conversation.phase(),
            previous_phase: conversation.previous_phase(),
            exchange_id: conversation.exchange_id(),
            entered_at: conversation.entered_at(),
            expires_at: conversation.expires_at(),
            last_event_at: conversation.last_event_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExchangeView {
    pub id: ExchangeId,
    pub contact_id: ContactId,
    pub initiator: Party,
    pub status: ExchangeStatus,
    pub our_proposal: Option<Terms>,
    pub their_proposal: Option<Terms>,
    pub terms: Option<Terms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub initiated_at: Timestamp,
    pub agreed_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub timeout_at: Timestamp,
}

impl From<&Exchange> for ExchangeView {
    fn from(exchange: &Exchange) -> Self {
        Self {
            id: exchange.id(),
            contact_id: exchange.contact_id(),
            initiator: exchange.initiator(),
            status: exchange.status(),
            our_proposal: exchange.proposal(Party::Us).cloned(),
            their_proposal: exchange.proposal(Party::Them).cloned(),
            terms: exchange.terms().cloned(),
            failure_reason: exchange.failure_reason().map(str::to_string),
            initiated_at: exchange.initiated_at(),
            agreed_at: exchange.agreed_at(),
            closed_at: exchange.closed_at(),
            timeout_at: exchange.timeout_at(),
        }
    }
}

/// Exchange with its full message history.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeDetailResponse {
    #[serde(flatten)]
    pub exchange: ExchangeView,
    pub transcript: Vec<TranscriptEntry>,
}

impl From<&Exchange> for ExchangeDetailResponse {
    fn from(exchange: &Exchange) -> Self {
        Self {
            exchange: ExchangeView::from(exchange),
            transcript: exchange.transcript().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationResponse {
    pub conversation: Option<ConversationView>,
    pub exchange: Option<ExchangeView>,
}

impl From<&NegotiationSnapshot> for NegotiationResponse {
    fn from(snapshot: &NegotiationSnapshot) -> Self {
        Self {
            conversation: snapshot.conversation.as_ref().map(ConversationView::from),
            exchange: snapshot.exchange.as_ref().map(ExchangeView::from),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferResponse {
    pub contact: ContactResponse,
    pub negotiation: NegotiationResponse,
}
