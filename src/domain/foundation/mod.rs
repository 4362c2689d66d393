//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, the state machine trait, event
//! plumbing and error types shared by every broker domain.

mod errors;
mod events;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{domain_event, DomainEvent, EventEnvelope, EventId};
pub use ids::{ContactId, ConversationId, ExchangeId, LeaseId, ProfileId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
