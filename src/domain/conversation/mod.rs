//! Conversation domain: the per-contact negotiation in progress.

mod aggregate;
mod context;
mod state;

pub use aggregate::{Conversation, ConversationParts};
pub use context::NegotiationContext;
pub use state::NegotiationPhase;
