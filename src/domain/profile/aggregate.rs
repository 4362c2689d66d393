//! Automation profile aggregate.
//!
//! A profile is one of our own platform identities used to perform actions.
//! It carries a daily action quota that resets lazily on the first touch of
//! a new UTC day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ProfileId, Timestamp, ValidationError};

/// Upper bound accepted for a daily quota.
pub const MAX_DAILY_ACTIONS_LIMIT: u32 = 10_000;

/// Caller-supplied outcome of using a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub success: bool,
    /// The platform signalled that the profile was banned or restricted.
    #[serde(default)]
    pub ban_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationProfile {
    id: ProfileId,
    handle: String,
    active: bool,
    is_banned: bool,
    banned_at: Option<Timestamp>,
    total_uses: u32,
    successful_uses: u32,
    failed_uses: u32,
    daily_actions: u32,
    daily_actions_date: Option<NaiveDate>,
    max_daily_actions: u32,
    last_used_at: Option<Timestamp>,
    last_health_check_at: Option<Timestamp>,
    created_at: Timestamp,
}

/// Persisted form of an [`AutomationProfile`].
#[derive(Debug, Clone)]
pub struct ProfileParts {
    pub id: ProfileId,
    pub handle: String,
    pub active: bool,
    pub is_banned: bool,
    pub banned_at: Option<Timestamp>,
    pub total_uses: u32,
    pub successful_uses: u32,
    pub failed_uses: u32,
    pub daily_actions: u32,
    pub daily_actions_date: Option<NaiveDate>,
    pub max_daily_actions: u32,
    pub last_used_at: Option<Timestamp>,
    pub last_health_check_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl AutomationProfile {
    /// Registers a new active profile.
    ///
    /// # Errors
    ///
    /// - `EmptyField` for a blank handle
    /// - `OutOfRange` when the quota is zero or above [`MAX_DAILY_ACTIONS_LIMIT`]
    pub fn register(
        handle: impl Into<String>,
        max_daily_actions: u32,
        at: Timestamp,
    ) -> Result<Self, ValidationError> {
        let handle = handle.into().trim().to_string();
        if handle.is_empty() {
            return Err(ValidationError::empty_field("handle"));
        }
        if max_daily_actions == 0 || max_daily_actions > MAX_DAILY_ACTIONS_LIMIT {
            return Err(ValidationError::out_of_range(
                "max_daily_actions",
                1,
                i64::from(MAX_DAILY_ACTIONS_LIMIT),
                i64::from(max_daily_actions),
            ));
        }
        Ok(Self {
            id: ProfileId::new(),
            handle,
            active: true,
            is_banned: false,
            banned_at: None,
            total_uses: 0,
            successful_uses: 0,
            failed_uses: 0,
            daily_actions: 0,
            daily_actions_date: Some(at.date()),
            max_daily_actions,
            last_used_at: None,
            last_health_check_at: None,
            created_at: at,
        })
    }

    /// Reconstitute from persistence (no validation).
    pub fn reconstitute(parts: ProfileParts) -> Self {
        Self {
            id: parts.id,
            handle: parts.handle,
            active: parts.active,
            is_banned: parts.is_banned,
            banned_at: parts.banned_at,
            total_uses: parts.total_uses,
            successful_uses: parts.successful_uses,
            failed_uses: parts.failed_uses,
            daily_actions: parts.daily_actions,
            daily_actions_date: parts.daily_actions_date,
            max_daily_actions: parts.max_daily_actions,
            last_used_at: parts.last_used_at,
            last_health_check_at: parts.last_health_check_at,
            created_at: parts.created_at,
        }
    }

    pub fn id(&self) -> ProfileId {
        self.id
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_banned(&self) -> bool {
        self.is_banned
    }

    pub fn banned_at(&self) -> Option<Timestamp> {
        self.banned_at
    }

    pub fn total_uses(&self) -> u32 {
        self.total_uses
    }

    pub fn successful_uses(&self) -> u32 {
        self.successful_uses
    }

    pub fn failed_uses(&self) -> u32 {
        self.failed_uses
    }

    pub fn daily_actions(&self) -> u32 {
        self.daily_actions
    }

    pub fn daily_actions_date(&self) -> Option<NaiveDate> {
        self.daily_actions_date
    }

    pub fn max_daily_actions(&self) -> u32 {
        self.max_daily_actions
    }

    pub fn last_used_at(&self) -> Option<Timestamp> {
        self.last_used_at
    }

    pub fn last_health_check_at(&self) -> Option<Timestamp> {
        self.last_health_check_at
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Active and not banned.
    pub fn is_usable(&self) -> bool {
        self.active && !self.is_banned
    }

    /// Actions recorded today, treating a stale date as zero.
    pub fn actions_on(&self, today: NaiveDate) -> u32 {
        if self.daily_actions_date == Some(today) {
            self.daily_actions
        } else {
            0
        }
    }

    /// Quota left today once `reserved` outstanding leases are accounted for.
    pub fn remaining_on(&self, today: NaiveDate, reserved: u32) -> u32 {
        self.max_daily_actions
            .saturating_sub(self.actions_on(today))
            .saturating_sub(reserved)
    }

    /// Resets the daily counter when the stored date is not `today`.
    pub fn reset_if_stale(&mut self, today: NaiveDate) -> bool {
        if self.daily_actions_date == Some(today) {
            return false;
        }
        self.daily_actions = 0;
        self.daily_actions_date = Some(today);
        true
    }

    /// Counts one use against today's quota.
    pub fn record_use(&mut self, report: UsageReport, at: Timestamp) {
        self.reset_if_stale(at.date());
        self.total_uses = self.total_uses.saturating_add(1);
        if report.success {
            self.successful_uses = self.successful_uses.saturating_add(1);
        } else {
            self.failed_uses = self.failed_uses.saturating_add(1);
        }
        self.daily_actions = self.daily_actions.saturating_add(1);
        self.last_used_at = Some(at);
        if report.ban_detected {
            self.ban(at);
        }
    }

    /// Records a health check; a failed check bans the profile.
    pub fn record_health(&mut self, healthy: bool, at: Timestamp) {
        self.last_health_check_at = Some(at);
        if !healthy {
            self.ban(at);
        }
    }

    pub fn ban(&mut self, at: Timestamp) {
        if !self.is_banned {
            self.is_banned = true;
            self.banned_at = Some(at);
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn activate(&mut self) {
        self.active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(secs: i64) -> Timestamp {
        // 2023-11-14T22:13:20Z
        Timestamp::from_unix_secs(1_700_000_000 + secs)
    }

    fn profile(max: u32) -> AutomationProfile {
        AutomationProfile::register("bot-1", max, t(0)).unwrap()
    }

    const OK: UsageReport = UsageReport {
        success: true,
        ban_detected: false,
    };

    #[test]
    fn register_validates_input() {
        assert!(AutomationProfile::register(" ", 10, t(0)).is_err());
        assert!(AutomationProfile::register("bot", 0, t(0)).is_err());
        assert!(AutomationProfile::register("bot", MAX_DAILY_ACTIONS_LIMIT + 1, t(0)).is_err());
    }

    #[test]
    fn record_use_counts_against_quota() {
        let mut p = profile(3);
        p.record_use(OK, t(1));
        p.record_use(
            UsageReport {
                success: false,
                ban_detected: false,
            },
            t(2),
        );
        assert_eq!(p.daily_actions(), 2);
        assert_eq!(p.successful_uses(), 1);
        assert_eq!(p.failed_uses(), 1);
        assert_eq!(p.remaining_on(t(2).date(), 0), 1);
        assert_eq!(p.remaining_on(t(2).date(), 1), 0);
    }

    #[test]
    fn quota_resets_on_new_day() {
        let mut p = profile(2);
        p.record_use(OK, t(1));
        p.record_use(OK, t(2));
        let tomorrow = t(2).plus(Duration::days(1));
        assert_eq!(p.actions_on(tomorrow.date()), 0);
        assert!(p.reset_if_stale(tomorrow.date()));
        assert!(!p.reset_if_stale(tomorrow.date()));
        assert_eq!(p.daily_actions(), 0);
    }

    #[test]
    fn use_on_new_day_starts_fresh_count() {
        let mut p = profile(5);
        p.record_use(OK, t(1));
        p.record_use(OK, t(1).plus(Duration::days(1)));
        assert_eq!(p.daily_actions(), 1);
        assert_eq!(p.total_uses(), 2);
    }

    #[test]
    fn ban_signal_marks_profile_unusable() {
        let mut p = profile(5);
        p.record_use(
            UsageReport {
                success: false,
                ban_detected: true,
            },
            t(3),
        );
        assert!(p.is_banned());
        assert_eq!(p.banned_at(), Some(t(3)));
        assert!(!p.is_usable());
    }

    #[test]
    fn failed_health_check_bans_once() {
        let mut p = profile(5);
        p.record_health(true, t(1));
        assert!(p.is_usable());
        p.record_health(false, t(2));
        p.record_health(false, t(3));
        assert_eq!(p.banned_at(), Some(t(2)));
        assert_eq!(p.last_health_check_at(), Some(t(3)));
    }
}
