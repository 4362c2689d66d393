//! Reliability scoring - pure trust metric derived from exchange history.

mod scorer;

pub use scorer::{ExchangeTally, ReliabilityScore, ReliabilityScorer};
