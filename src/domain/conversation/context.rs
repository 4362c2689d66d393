//! Working memory of an active negotiation.

use serde::{Deserialize, Serialize};

use crate::domain::exchange::Terms;

/// Latest state of the back-and-forth, kept alongside the phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationContext {
    pub their_terms: Option<Terms>,
    pub our_terms: Option<Terms>,
    /// Set when an operator fixed our terms; the counter-offer policy leaves them alone.
    #[serde(default)]
    pub our_terms_pinned: bool,
    pub their_video_url: Option<String>,
    pub last_message: Option<String>,
    #[serde(default)]
    pub messages_seen: u32,
}
