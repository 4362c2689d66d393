//! Event bus adapters.
//!
//! - `InMemoryEventBus` - in-process bus with retention and live subscribers

mod in_memory;

pub use in_memory::{InMemoryEventBus, DEFAULT_RETENTION};
