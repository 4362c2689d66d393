//! Automation profile domain: our own identities and their daily quotas.

mod aggregate;

pub use aggregate::{AutomationProfile, ProfileParts, UsageReport, MAX_DAILY_ACTIONS_LIMIT};
