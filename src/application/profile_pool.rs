//! AutomationProfilePool - hands out profiles within their daily quota.
//!
//! Each acquisition takes a lease that counts against the profile's quota
//! until it is consumed by `record_use` or returned by `release`, so two
//! callers can never be handed the same last unit of a day's budget.

use chrono::Duration;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::errors::BrokerError;
use super::locks::KeyedLocks;
use crate::domain::foundation::{LeaseId, ProfileId, Timestamp};
use crate::domain::profile::{AutomationProfile, UsageReport};
use crate::ports::{Alert, AlertSink, AuditEntry, AuditKind, AuditLog, ProfileRepository};

/// A leased profile, valid until used or released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileHandle {
    pub profile_id: ProfileId,
    pub lease_id: LeaseId,
    pub handle: String,
}

/// Tracks one stretch of time during which no profile had capacity.
#[derive(Debug, Clone, Copy)]
struct Exhaustion {
    since: Timestamp,
    alerted: bool,
}

pub struct AutomationProfilePool {
    repository: Arc<dyn ProfileRepository>,
    alerts: Arc<dyn AlertSink>,
    audit: Arc<dyn AuditLog>,
    locks: KeyedLocks<ProfileId>,
    leases: Mutex<HashMap<LeaseId, ProfileId>>,
    exhaustion: Mutex<Option<Exhaustion>>,
    alert_threshold: Duration,
    default_max_daily_actions: u32,
}

impl AutomationProfilePool {
    pub fn new(
        repository: Arc<dyn ProfileRepository>,
        alerts: Arc<dyn AlertSink>,
        audit: Arc<dyn AuditLog>,
        alert_threshold: Duration,
        default_max_daily_actions: u32,
    ) -> Self {
        Self {
            repository,
            alerts,
            audit,
            locks: KeyedLocks::new(),
            leases: Mutex::new(HashMap::new()),
            exhaustion: Mutex::new(None),
            alert_threshold,
            default_max_daily_actions,
        }
    }

    /// Provisions a profile. Without an explicit quota the pool default applies.
    pub async fn register(
        &self,
        handle: impl Into<String>,
        max_daily_actions: Option<u32>,
        at: Timestamp,
    ) -> Result<AutomationProfile, BrokerError> {
        let profile = AutomationProfile::register(
            handle,
            max_daily_actions.unwrap_or(self.default_max_daily_actions),
            at,
        )?;
        self.repository.insert(&profile).await?;
        info!(profile_id = %profile.id(), handle = %profile.handle(), "Profile registered");
        Ok(profile)
    }

    /// Leases a profile with quota left today.
    ///
    /// Profiles with the most remaining quota are preferred. Fails
    /// immediately with `NoCapacityAvailable` when none qualifies.
    pub async fn acquire(&self, now: Timestamp) -> Result<ProfileHandle, BrokerError> {
        let today = now.date();
        let mut candidates: Vec<AutomationProfile> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(AutomationProfile::is_usable)
            .collect();
        candidates.sort_by_key(|p| std::cmp::Reverse(p.remaining_on(today, 0)));

        for candidate in &candidates {
            let _guard = self.locks.lock(candidate.id()).await;

            // Re-read under the profile lock; the listing may be stale.
            let Some(mut profile) = self.repository.find_by_id(candidate.id()).await? else {
                continue;
            };
            if !profile.is_usable() {
                continue;
            }
            if profile.reset_if_stale(today) {
                self.repository.update(&profile).await?;
            }
            if profile.remaining_on(today, self.outstanding(profile.id())) == 0 {
                continue;
            }

            let lease_id = LeaseId::new();
            self.leases_guard().insert(lease_id, profile.id());
            self.end_exhaustion();
            debug!(profile_id = %profile.id(), lease_id = %lease_id, "Profile leased");
            return Ok(ProfileHandle {
                profile_id: profile.id(),
                lease_id,
                handle: profile.handle().to_string(),
            });
        }

        self.note_exhaustion(now, candidates.len()).await?;
        Err(BrokerError::NoCapacityAvailable)
    }

    /// Counts one use of a leased profile and consumes the lease.
    pub async fn record_use(
        &self,
        profile_id: ProfileId,
        lease_id: Option<LeaseId>,
        report: UsageReport,
        at: Timestamp,
    ) -> Result<AutomationProfile, BrokerError> {
        let _guard = self.locks.lock(profile_id).await;

        let mut profile = self.load(profile_id).await?;
        profile.record_use(report, at);
        self.repository.update(&profile).await?;
        if let Some(lease_id) = lease_id {
            self.leases_guard().remove(&lease_id);
        }

        if report.ban_detected {
            warn!(profile_id = %profile_id, "Profile banned after use");
        }
        Ok(profile)
    }

    /// Returns a lease without using it. Releasing twice is harmless.
    pub fn release(&self, lease_id: LeaseId) -> bool {
        self.leases_guard().remove(&lease_id).is_some()
    }

    /// Records a health check; an unhealthy profile is banned.
    pub async fn health_check(
        &self,
        profile_id: ProfileId,
        healthy: bool,
        at: Timestamp,
    ) -> Result<AutomationProfile, BrokerError> {
        let _guard = self.locks.lock(profile_id).await;

        let mut profile = self.load(profile_id).await?;
        profile.record_health(healthy, at);
        self.repository.update(&profile).await?;

        if !healthy {
            warn!(profile_id = %profile_id, "Profile failed health check and was banned");
        }
        Ok(profile)
    }

    pub async fn get(&self, profile_id: ProfileId) -> Result<AutomationProfile, BrokerError> {
        self.load(profile_id).await
    }

    pub async fn list(&self) -> Result<Vec<AutomationProfile>, BrokerError> {
        Ok(self.repository.list().await?)
    }

    /// Leases handed out for `profile_id` and not yet used or released.
    pub fn outstanding(&self, profile_id: ProfileId) -> u32 {
        self.leases_guard()
            .values()
            .filter(|id| **id == profile_id)
            .count() as u32
    }

    async fn load(&self, profile_id: ProfileId) -> Result<AutomationProfile, BrokerError> {
        self.repository
            .find_by_id(profile_id)
            .await?
            .ok_or_else(|| BrokerError::not_found("profile", profile_id))
    }

    fn leases_guard(&self) -> std::sync::MutexGuard<'_, HashMap<LeaseId, ProfileId>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn end_exhaustion(&self) {
        let mut exhaustion = self.exhaustion.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(episode) = exhaustion.take() {
            info!(since = %episode.since, "Profile capacity available again");
        }
    }

    /// Starts or extends an exhaustion episode, alerting once per episode
    /// after the threshold has passed.
    async fn note_exhaustion(&self, now: Timestamp, profiles: usize) -> Result<(), BrokerError> {
        let since = {
            let mut exhaustion = self.exhaustion.lock().unwrap_or_else(PoisonError::into_inner);
            let episode = exhaustion.get_or_insert(Exhaustion {
                since: now,
                alerted: false,
            });
            if episode.alerted || now.duration_since(&episode.since) < self.alert_threshold {
                None
            } else {
                episode.alerted = true;
                Some(episode.since)
            }
        };

        warn!(profiles, "No automation profile has capacity");
        let Some(since) = since else {
            return Ok(());
        };

        self.audit
            .record(AuditEntry::system(
                AuditKind::CapacityExhausted,
                format!("no capacity since {}", since),
                now,
            ))
            .await?;
        self.alerts
            .raise(Alert::CapacityExhausted {
                since,
                raised_at: now,
                profiles,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::alerting::TracingAlertSink;
    use crate::adapters::memory::{InMemoryAuditLog, InMemoryProfileRepository};

    struct Fixture {
        pool: AutomationProfilePool,
        alerts: Arc<TracingAlertSink>,
        audit: Arc<InMemoryAuditLog>,
    }

    fn fixture() -> Fixture {
        let alerts = Arc::new(TracingAlertSink::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let pool = AutomationProfilePool::new(
            Arc::new(InMemoryProfileRepository::new()),
            alerts.clone(),
            audit.clone(),
            Duration::minutes(15),
            50,
        );
        Fixture {
            pool,
            alerts,
            audit,
        }
    }

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs)
    }

    fn ok() -> UsageReport {
        UsageReport {
            success: true,
            ban_detected: false,
        }
    }

    mod acquire {
        use super::*;

        #[tokio::test]
        async fn fails_without_profiles() {
            let f = fixture();
            let err = f.pool.acquire(t(0)).await.unwrap_err();
            assert!(matches!(err, BrokerError::NoCapacityAvailable));
        }

        #[tokio::test]
        async fn used_quota_blocks_second_acquire_same_day() {
            let f = fixture();
            let profile = f.pool.register("bot-1", Some(1), t(0)).await.unwrap();

            let handle = f.pool.acquire(t(1)).await.unwrap();
            assert_eq!(handle.profile_id, profile.id());
            f.pool
                .record_use(handle.profile_id, Some(handle.lease_id), ok(), t(2))
                .await
                .unwrap();

            let err = f.pool.acquire(t(3)).await.unwrap_err();
            assert!(matches!(err, BrokerError::NoCapacityAvailable));
        }

        #[tokio::test]
        async fn outstanding_lease_reserves_quota() {
            let f = fixture();
            f.pool.register("bot-1", Some(1), t(0)).await.unwrap();

            let handle = f.pool.acquire(t(1)).await.unwrap();
            assert!(f.pool.acquire(t(2)).await.is_err());

            assert!(f.pool.release(handle.lease_id));
            assert!(!f.pool.release(handle.lease_id));
            assert!(f.pool.acquire(t(3)).await.is_ok());
        }

        #[tokio::test]
        async fn quota_resets_on_new_day() {
            let f = fixture();
            f.pool.register("bot-1", Some(1), t(0)).await.unwrap();
            let handle = f.pool.acquire(t(1)).await.unwrap();
            f.pool
                .record_use(handle.profile_id, Some(handle.lease_id), ok(), t(2))
                .await
                .unwrap();

            let tomorrow = t(2).plus(Duration::days(1));
            assert!(f.pool.acquire(tomorrow).await.is_ok());
        }

        #[tokio::test]
        async fn banned_profiles_are_skipped() {
            let f = fixture();
            let profile = f.pool.register("bot-1", None, t(0)).await.unwrap();
            f.pool.health_check(profile.id(), false, t(1)).await.unwrap();

            assert!(f.pool.acquire(t(2)).await.is_err());
        }

        #[tokio::test]
        async fn concurrent_acquires_respect_the_cap() {
            let f = Arc::new(fixture());
            f.pool.register("bot-1", Some(3), t(0)).await.unwrap();

            let tasks: Vec<_> = (0..10)
                .map(|_| {
                    let f = Arc::clone(&f);
                    tokio::spawn(async move { f.pool.acquire(t(1)).await.is_ok() })
                })
                .collect();
            let mut granted = 0;
            for task in tasks {
                if task.await.unwrap() {
                    granted += 1;
                }
            }
            assert_eq!(granted, 3);
        }
    }

    mod alerting {
        use super::*;

        #[tokio::test]
        async fn alerts_once_per_exhaustion_episode() {
            let f = fixture();

            assert!(f.pool.acquire(t(0)).await.is_err());
            assert!(f.pool.acquire(t(600)).await.is_err());
            assert_eq!(f.alerts.raised_count(), 0);

            assert!(f.pool.acquire(t(900)).await.is_err());
            assert!(f.pool.acquire(t(1200)).await.is_err());
            assert_eq!(f.alerts.raised_count(), 1);
            assert_eq!(f.audit.count_of(AuditKind::CapacityExhausted).await, 1);
        }

        #[tokio::test]
        async fn successful_acquire_ends_the_episode() {
            let f = fixture();
            assert!(f.pool.acquire(t(0)).await.is_err());

            let profile = f.pool.register("bot-1", Some(1), t(100)).await.unwrap();
            let handle = f.pool.acquire(t(200)).await.unwrap();
            f.pool
                .record_use(profile.id(), Some(handle.lease_id), ok(), t(300))
                .await
                .unwrap();

            // New episode starts at t(400); threshold not yet reached at t(1000).
            assert!(f.pool.acquire(t(400)).await.is_err());
            assert!(f.pool.acquire(t(1000)).await.is_err());
            assert_eq!(f.alerts.raised_count(), 0);
        }
    }

    #[tokio::test]
    async fn ban_signal_on_use_bans_profile() {
        let f = fixture();
        let profile = f.pool.register("bot-1", None, t(0)).await.unwrap();
        let handle = f.pool.acquire(t(1)).await.unwrap();

        let used = f
            .pool
            .record_use(
                profile.id(),
                Some(handle.lease_id),
                UsageReport {
                    success: false,
                    ban_detected: true,
                },
                t(2),
            )
            .await
            .unwrap();

        assert!(used.is_banned());
        assert_eq!(f.pool.outstanding(profile.id()), 0);
    }
}
