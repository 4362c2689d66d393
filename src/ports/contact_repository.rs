//! Contact repository port.
//!
//! Contacts are unique per (platform, external user id); implementations
//! enforce that on insert so concurrent discovery cannot create duplicates.

use async_trait::async_trait;

use crate::domain::contact::{Contact, ContactIdentity, RelaunchCriteria};
use crate::domain::foundation::{ContactId, DomainError, Timestamp};

#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Persist a new contact.
    ///
    /// # Errors
    ///
    /// - `ContactExists` if the identity is already registered
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, contact: &Contact) -> Result<(), DomainError>;

    /// Overwrite an existing contact.
    ///
    /// # Errors
    ///
    /// - `ContactNotFound` if it was never inserted
    /// - `DatabaseError` on persistence failure
    async fn update(&self, contact: &Contact) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: ContactId) -> Result<Option<Contact>, DomainError>;

    async fn find_by_identity(
        &self,
        identity: &ContactIdentity,
    ) -> Result<Option<Contact>, DomainError>;

    /// Contacts matching `criteria`, ordered as [`RelaunchCriteria::rank`] orders them.
    async fn find_relaunch_candidates(
        &self,
        criteria: &RelaunchCriteria,
        limit: u32,
    ) -> Result<Vec<Contact>, DomainError>;

    /// Ids of unblocked contacts whose status a recompute would change:
    /// flagged ones, and contacts we are waiting on with no activity since
    /// `idle_before`. See [`Contact::recompute_due`].
    async fn find_recompute_due(
        &self,
        idle_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<ContactId>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn ContactRepository) {}
    }
}
