//! In-memory automation profile repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, ProfileId};
use crate::domain::profile::AutomationProfile;
use crate::ports::ProfileRepository;

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<ProfileId, AutomationProfile>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn insert(&self, profile: &AutomationProfile) -> Result<(), DomainError> {
        let mut profiles = self.profiles.write().await;
        if profiles.values().any(|p| p.handle() == profile.handle()) {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("profile handle '{}' is already registered", profile.handle()),
            ));
        }
        profiles.insert(profile.id(), profile.clone());
        Ok(())
    }

    async fn update(&self, profile: &AutomationProfile) -> Result<(), DomainError> {
        let mut profiles = self.profiles.write().await;
        match profiles.get_mut(&profile.id()) {
            Some(slot) => {
                *slot = profile.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::ProfileNotFound,
                format!("profile {} not found", profile.id()),
            )),
        }
    }

    async fn find_by_id(&self, id: ProfileId) -> Result<Option<AutomationProfile>, DomainError> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<AutomationProfile>, DomainError> {
        let mut all: Vec<AutomationProfile> = self.profiles.read().await.values().cloned().collect();
        all.sort_by_key(|p| p.created_at());
        Ok(all)
    }
}
