//! Conversation aggregate.
//!
//! At most one conversation exists per contact. It tracks the negotiation
//! phase, the deadline for the current phase and the timestamp of the last
//! applied event, which is how out-of-order events are recognised.

use serde::{Deserialize, Serialize};

use super::context::NegotiationContext;
use super::state::NegotiationPhase;
use crate::domain::foundation::{
    ContactId, ConversationId, ExchangeId, StateMachine, Timestamp, ValidationError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    id: ConversationId,
    contact_id: ContactId,
    exchange_id: Option<ExchangeId>,
    phase: NegotiationPhase,
    previous_phase: Option<NegotiationPhase>,
    context: NegotiationContext,
    entered_at: Timestamp,
    expires_at: Timestamp,
    last_event_at: Timestamp,
    created_at: Timestamp,
}

/// Persisted form of a [`Conversation`].
#[derive(Debug, Clone)]
pub struct ConversationParts {
    pub id: ConversationId,
    pub contact_id: ContactId,
    pub exchange_id: Option<ExchangeId>,
    pub phase: NegotiationPhase,
    pub previous_phase: Option<NegotiationPhase>,
    pub context: NegotiationContext,
    pub entered_at: Timestamp,
    pub expires_at: Timestamp,
    pub last_event_at: Timestamp,
    pub created_at: Timestamp,
}

impl Conversation {
    /// Starts a conversation in `waiting_response`.
    pub fn start(contact_id: ContactId, at: Timestamp, expires_at: Timestamp) -> Self {
        Self {
            id: ConversationId::new(),
            contact_id,
            exchange_id: None,
            phase: NegotiationPhase::WaitingResponse,
            previous_phase: None,
            context: NegotiationContext::default(),
            entered_at: at,
            expires_at,
            last_event_at: at,
            created_at: at,
        }
    }

    /// Reconstitute from persistence (no validation).
    pub fn reconstitute(parts: ConversationParts) -> Self {
        Self {
            id: parts.id,
            contact_id: parts.contact_id,
            exchange_id: parts.exchange_id,
            phase: parts.phase,
            previous_phase: parts.previous_phase,
            context: parts.context,
            entered_at: parts.entered_at,
            expires_at: parts.expires_at,
            last_event_at: parts.last_event_at,
            created_at: parts.created_at,
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn contact_id(&self) -> ContactId {
        self.contact_id
    }

    pub fn exchange_id(&self) -> Option<ExchangeId> {
        self.exchange_id
    }

    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    pub fn previous_phase(&self) -> Option<NegotiationPhase> {
        self.previous_phase
    }

    pub fn context(&self) -> &NegotiationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut NegotiationContext {
        &mut self.context
    }

    pub fn entered_at(&self) -> Timestamp {
        self.entered_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn last_event_at(&self) -> Timestamp {
        self.last_event_at
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_before(&now)
    }

    /// An event older than the last applied one.
    pub fn is_stale(&self, at: Timestamp) -> bool {
        at.is_before(&self.last_event_at)
    }

    /// Links the exchange this conversation negotiates.
    pub fn link_exchange(&mut self, exchange_id: ExchangeId) -> Result<(), ValidationError> {
        match self.exchange_id {
            Some(existing) if existing != exchange_id => Err(ValidationError::invalid_format(
                "exchange_id",
                format!("conversation already negotiates exchange {}", existing),
            )),
            _ => {
                self.exchange_id = Some(exchange_id);
                Ok(())
            }
        }
    }

    /// Moves to `phase` with a fresh deadline.
    pub fn enter(
        &mut self,
        phase: NegotiationPhase,
        at: Timestamp,
        expires_at: Timestamp,
    ) -> Result<(), ValidationError> {
        let next = self.phase.transition_to(phase)?;
        self.previous_phase = Some(self.phase);
        self.phase = next;
        self.entered_at = at;
        self.expires_at = expires_at;
        Ok(())
    }

    pub fn reschedule(&mut self, expires_at: Timestamp) {
        self.expires_at = expires_at;
    }

    /// Records that an event at `at` was applied.
    pub fn touch(&mut self, at: Timestamp) {
        self.last_event_at = self.last_event_at.max(at);
    }
}
