//! Automation profile repository port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ProfileId};
use crate::domain::profile::AutomationProfile;

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// # Errors
    ///
    /// - `ValidationFailed` if the handle is already registered
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, profile: &AutomationProfile) -> Result<(), DomainError>;

    /// # Errors
    ///
    /// - `ProfileNotFound` if it was never inserted
    /// - `DatabaseError` on persistence failure
    async fn update(&self, profile: &AutomationProfile) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: ProfileId) -> Result<Option<AutomationProfile>, DomainError>;

    /// Every registered profile, oldest first.
    async fn list(&self) -> Result<Vec<AutomationProfile>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn ProfileRepository) {}
    }
}
