//! Request and response bodies for profile endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ProfileId, Timestamp};
use crate::domain::profile::AutomationProfile;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterProfileRequest {
    pub handle: String,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub max_daily_actions: Option<u32>,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckRequest {
    pub healthy: bool,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: ProfileId,
    pub handle: String,
    pub active: bool,
    pub is_banned: bool,
    pub banned_at: Option<Timestamp>,
    pub daily_actions: u32,
    pub max_daily_actions: u32,
    pub total_uses: u32,
    pub successful_uses: u32,
    pub failed_uses: u32,
    pub last_used_at: Option<Timestamp>,
    pub last_health_check_at: Option<Timestamp>,
}

impl From<&AutomationProfile> for ProfileResponse {
    fn from(profile: &AutomationProfile) -> Self {
        Self {
            id: profile.id(),
            handle: profile.handle().to_string(),
            active: profile.is_active(),
            is_banned: profile.is_banned(),
            banned_at: profile.banned_at(),
            daily_actions: profile.actions_on(Timestamp::now().date()),
            max_daily_actions: profile.max_daily_actions(),
            total_uses: profile.total_uses(),
            successful_uses: profile.successful_uses(),
            failed_uses: profile.failed_uses(),
            last_used_at: profile.last_used_at(),
            last_health_check_at: profile.last_health_check_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileListResponse {
    pub profiles: Vec<ProfileResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub released: bool,
}
