//! Timeout sweeper configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

pub const MIN_SWEEP_INTERVAL_SECS: u64 = 60;
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Most conversations and exchanges expired per pass, each.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_range(
            "sweeper.interval_secs",
            self.interval_secs,
            MIN_SWEEP_INTERVAL_SECS,
            MAX_SWEEP_INTERVAL_SECS,
        )?;
        ValidationError::check_range("sweeper.batch_size", u64::from(self.batch_size), 1, 10_000)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_interval() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_two_minutes() {
        let config = SweeperConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn interval_must_stay_within_one_to_five_minutes() {
        for secs in [59, 301] {
            let config = SweeperConfig {
                interval_secs: secs,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{}", secs);
        }
    }
}
