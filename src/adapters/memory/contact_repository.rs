//! In-memory contact repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::contact::{Contact, ContactIdentity, RelaunchCriteria};
use crate::domain::foundation::{ContactId, DomainError, ErrorCode, Timestamp};
use crate::ports::ContactRepository;

#[derive(Default)]
struct Store {
    by_id: HashMap<ContactId, Contact>,
    by_identity: HashMap<ContactIdentity, ContactId>,
}

/// Contact storage backed by a map; identity uniqueness is checked under
/// the same write lock as the insert.
#[derive(Default)]
pub struct InMemoryContactRepository {
    store: RwLock<Store>,
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.by_id.len()
    }
}

#[async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn insert(&self, contact: &Contact) -> Result<(), DomainError> {
        let mut store = self.store.write().await;
        if store.by_identity.contains_key(contact.identity()) {
            return Err(DomainError::new(
                ErrorCode::ContactExists,
                format!("contact {} already exists", contact.identity()),
            ));
        }
        store
            .by_identity
            .insert(contact.identity().clone(), contact.id());
        store.by_id.insert(contact.id(), contact.clone());
        Ok(())
    }

    async fn update(&self, contact: &Contact) -> Result<(), DomainError> {
        let mut store = self.store.write().await;
        match store.by_id.get_mut(&contact.id()) {
            Some(slot) => {
                *slot = contact.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::ContactNotFound,
                format!("contact {} not found", contact.id()),
            )),
        }
    }

    async fn find_by_id(&self, id: ContactId) -> Result<Option<Contact>, DomainError> {
        Ok(self.store.read().await.by_id.get(&id).cloned())
    }

    async fn find_by_identity(
        &self,
        identity: &ContactIdentity,
    ) -> Result<Option<Contact>, DomainError> {
        let store = self.store.read().await;
        Ok(store
            .by_identity
            .get(identity)
            .and_then(|id| store.by_id.get(id))
            .cloned())
    }

    async fn find_relaunch_candidates(
        &self,
        criteria: &RelaunchCriteria,
        limit: u32,
    ) -> Result<Vec<Contact>, DomainError> {
        let store = self.store.read().await;
        let mut selected = criteria.select(store.by_id.values().cloned());
        selected.truncate(limit as usize);
        Ok(selected)
    }

    async fn find_recompute_due(
        &self,
        idle_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<ContactId>, DomainError> {
        let store = self.store.read().await;
        let mut due: Vec<&Contact> = store
            .by_id
            .values()
            .filter(|c| c.recompute_due(idle_before))
            .collect();
        due.sort_by_key(|c| c.last_activity_at());
        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(Contact::id)
            .collect())
    }
}
