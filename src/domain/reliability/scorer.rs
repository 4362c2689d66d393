//! Reliability scorer.
//!
//! ```text
//! score = clamp(50 + min(successful × 5, 40) + rate_bonus − min(failed × 10, 50), 0, 100)
//! rate_bonus = 20 if successful/total > 0.8, else 10 if > 0.6, else 0
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

/// Score assigned to a contact with no history.
pub const NEUTRAL_SCORE: u8 = 50;

const SUCCESS_STEP: i64 = 5;
const SUCCESS_CAP: i64 = 40;
const FAILURE_STEP: i64 = 10;
const FAILURE_CAP: i64 = 50;
const HIGH_RATE_BONUS: i64 = 20;
const MID_RATE_BONUS: i64 = 10;

/// Trust score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ReliabilityScore(u8);

impl ReliabilityScore {
    /// Maximum representable score.
    pub const MAX: u8 = 100;

    /// Creates a score, rejecting values above 100.
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value > Self::MAX {
            return Err(ValidationError::out_of_range(
                "reliability_score",
                0,
                Self::MAX as i64,
                value as i64,
            ));
        }
        Ok(Self(value))
    }

    /// The score every newly discovered contact starts with.
    pub fn neutral() -> Self {
        Self(NEUTRAL_SCORE)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for ReliabilityScore {
    fn default() -> Self {
        Self::neutral()
    }
}

impl TryFrom<u8> for ReliabilityScore {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ReliabilityScore> for u8 {
    fn from(score: ReliabilityScore) -> Self {
        score.0
    }
}

impl fmt::Display for ReliabilityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exchange counters kept on a contact.
///
/// `total` counts every finished exchange, including our own `failed`
/// executions, while `failed` only counts partner failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTally {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

impl ExchangeTally {
    /// Scores this tally.
    pub fn score(&self) -> ReliabilityScore {
        ReliabilityScorer::score(self.successful, self.total, self.failed)
    }
}

/// Stateless calculator for contact reliability.
pub struct ReliabilityScorer;

impl ReliabilityScorer {
    /// Computes the reliability score for the given counters.
    ///
    /// Deterministic and side-effect free; persisting the result is the
    /// contact registry's job.
    pub fn score(successful: u32, total: u32, failed: u32) -> ReliabilityScore {
        let successful = i64::from(successful);
        let total = i64::from(total);
        let failed = i64::from(failed);

        let success_bonus = (successful * SUCCESS_STEP).min(SUCCESS_CAP);
        let failure_penalty = (failed * FAILURE_STEP).min(FAILURE_CAP);
        let rate_bonus = Self::rate_bonus(successful, total);

        let raw = i64::from(NEUTRAL_SCORE) + success_bonus + rate_bonus - failure_penalty;
        // Clamped into 0..=100 so the narrowing cast cannot truncate.
        ReliabilityScore(raw.clamp(0, i64::from(ReliabilityScore::MAX)) as u8)
    }

    /// Success-rate bonus compared with integer cross-multiplication so the
    /// 0.8 / 0.6 boundaries are exact.
    fn rate_bonus(successful: i64, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        if successful * 5 > total * 4 {
            HIGH_RATE_BONUS
        } else if successful * 5 > total * 3 {
            MID_RATE_BONUS
        } else {
            0
        }
    }
}
