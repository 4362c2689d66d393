//! Negotiation policy configuration

use chrono::Duration;
use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::exchange::{ActionKind, Terms};

#[derive(Debug, Clone, Deserialize)]
pub struct NegotiationConfig {
    /// How long to wait for a first reply.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,

    /// How long terms may be negotiated, and how long both sides have to
    /// complete once agreed.
    #[serde(default = "default_negotiation_timeout")]
    pub negotiation_timeout_secs: u64,

    /// Contacts we are waiting on go unresponsive after this many idle days.
    #[serde(default = "default_inactivity_window")]
    pub inactivity_window_days: u32,

    /// Most we offer per action when countering; 0 drops that action from
    /// our counter-offers. With every cap at 0 no limits apply and we mirror
    /// the contact's terms.
    #[serde(default = "default_max_likes")]
    pub max_likes: u32,
    #[serde(default = "default_max_subscribes")]
    pub max_subscribes: u32,
    #[serde(default = "default_max_comments")]
    pub max_comments: u32,
    #[serde(default = "default_max_watch_seconds")]
    pub max_watch_seconds: u32,

    #[serde(default = "default_relaunch_min_score")]
    pub relaunch_min_score: u8,
    #[serde(default = "default_relaunch_min_exchanges")]
    pub relaunch_min_exchanges: u32,
    #[serde(default = "default_relaunch_cooldown")]
    pub relaunch_cooldown_days: u32,
}

impl NegotiationConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::seconds(self.response_timeout_secs as i64)
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::seconds(self.negotiation_timeout_secs as i64)
    }

    pub fn inactivity_window(&self) -> Duration {
        Duration::days(i64::from(self.inactivity_window_days))
    }

    pub fn relaunch_cooldown(&self) -> Duration {
        Duration::days(i64::from(self.relaunch_cooldown_days))
    }

    /// Caps applied to counter-offers; `None` (mirror uncapped) when every
    /// cap is zero.
    pub fn counter_limits(&self) -> Option<Terms> {
        let limits = [
            (ActionKind::Like, self.max_likes),
            (ActionKind::Subscribe, self.max_subscribes),
            (ActionKind::Comment, self.max_comments),
            (ActionKind::WatchSeconds, self.max_watch_seconds),
        ]
        .into_iter()
        .filter(|(_, max)| *max > 0)
        .map(|(kind, max)| (kind, i64::from(max)));
        Terms::new(limits).ok()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        const WEEK: u64 = 7 * 24 * 3600;
        ValidationError::check_range("response_timeout_secs", self.response_timeout_secs, 60, WEEK)?;
        ValidationError::check_range(
            "negotiation_timeout_secs",
            self.negotiation_timeout_secs,
            60,
            WEEK,
        )?;
        ValidationError::check_range(
            "inactivity_window_days",
            u64::from(self.inactivity_window_days),
            1,
            365,
        )?;
        ValidationError::check_range(
            "relaunch_min_score",
            u64::from(self.relaunch_min_score),
            0,
            100,
        )?;
        Ok(())
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: default_response_timeout(),
            negotiation_timeout_secs: default_negotiation_timeout(),
            inactivity_window_days: default_inactivity_window(),
            max_likes: default_max_likes(),
            max_subscribes: default_max_subscribes(),
            max_comments: default_max_comments(),
            max_watch_seconds: default_max_watch_seconds(),
            relaunch_min_score: default_relaunch_min_score(),
            relaunch_min_exchanges: default_relaunch_min_exchanges(),
            relaunch_cooldown_days: default_relaunch_cooldown(),
        }
    }
}

fn default_response_timeout() -> u64 {
    48 * 3600
}

fn default_negotiation_timeout() -> u64 {
    24 * 3600
}

fn default_inactivity_window() -> u32 {
    14
}

fn default_max_likes() -> u32 {
    10
}

fn default_max_subscribes() -> u32 {
    1
}

fn default_max_comments() -> u32 {
    3
}

fn default_max_watch_seconds() -> u32 {
    300
}

fn default_relaunch_min_score() -> u8 {
    70
}

fn default_relaunch_min_exchanges() -> u32 {
    1
}

fn default_relaunch_cooldown() -> u32 {
    7
}
