//! Conversation repository port.
//!
//! Holds at most one conversation per contact.

use async_trait::async_trait;

use crate::domain::conversation::Conversation;
use crate::domain::foundation::{ContactId, DomainError, Timestamp};

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// # Errors
    ///
    /// - `ConversationExists` if the contact already has one
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, conversation: &Conversation) -> Result<(), DomainError>;

    /// # Errors
    ///
    /// - `ConversationNotFound` if the contact has none
    /// - `DatabaseError` on persistence failure
    async fn update(&self, conversation: &Conversation) -> Result<(), DomainError>;

    async fn find_by_contact(
        &self,
        contact_id: ContactId,
    ) -> Result<Option<Conversation>, DomainError>;

    /// Removes the contact's conversation. Returns whether one existed.
    async fn delete(&self, contact_id: ContactId) -> Result<bool, DomainError>;

    /// Conversations whose deadline is before `now`, oldest deadline first.
    async fn find_expired(&self, now: Timestamp, limit: u32)
        -> Result<Vec<Conversation>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn ConversationRepository) {}
    }
}
