//! Exchange domain: negotiated reciprocal engagements.

mod aggregate;
mod errors;
mod events;
mod execution;
mod status;
mod terms;
mod transcript;

pub use aggregate::{Exchange, ExchangeParts, Party, TIMEOUT_REASON};
pub use errors::ExchangeError;
pub use events::{ExchangeAgreed, ExchangeClosed, ExchangeCompleted};
pub use execution::{
    ActionOutcome, ActionResults, Coverage, ExecutionRecord, VerificationRecord,
};
pub use status::ExchangeStatus;
pub use terms::{ActionKind, Terms};
pub use transcript::{Direction, TranscriptEntry};
