//! Automation profile pool configuration

use chrono::Duration;
use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::profile::MAX_DAILY_ACTIONS_LIMIT;

#[derive(Debug, Clone, Deserialize)]
pub struct ProfilePoolConfig {
    /// Alert once no profile has had capacity for this long.
    #[serde(default = "default_alert_threshold")]
    pub capacity_alert_threshold_secs: u64,

    /// Quota given to profiles registered without one.
    #[serde(default = "default_max_daily_actions")]
    pub default_max_daily_actions: u32,
}

impl ProfilePoolConfig {
    pub fn capacity_alert_threshold(&self) -> Duration {
        Duration::seconds(self.capacity_alert_threshold_secs as i64)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_range(
            "profiles.capacity_alert_threshold_secs",
            self.capacity_alert_threshold_secs,
            0,
            24 * 3600,
        )?;
        ValidationError::check_range(
            "profiles.default_max_daily_actions",
            u64::from(self.default_max_daily_actions),
            1,
            u64::from(MAX_DAILY_ACTIONS_LIMIT),
        )
    }
}

impl Default for ProfilePoolConfig {
    fn default() -> Self {
        Self {
            capacity_alert_threshold_secs: default_alert_threshold(),
            default_max_daily_actions: default_max_daily_actions(),
        }
    }
}

fn default_alert_threshold() -> u64 {
    15 * 60
}

fn default_max_daily_actions() -> u32 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_fifteen_minutes() {
        let config = ProfilePoolConfig::default();
        assert_eq!(config.capacity_alert_threshold(), Duration::minutes(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_default_quota_is_rejected() {
        let config = ProfilePoolConfig {
            default_max_daily_actions: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
