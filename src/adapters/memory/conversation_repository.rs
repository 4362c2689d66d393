//! In-memory conversation repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::conversation::Conversation;
use crate::domain::foundation::{ContactId, DomainError, ErrorCode, Timestamp};
use crate::ports::ConversationRepository;

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<ContactId, Conversation>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active conversations held.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn insert(&self, conversation: &Conversation) -> Result<(), DomainError> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.contact_id()) {
            return Err(DomainError::new(
                ErrorCode::ConversationExists,
                format!(
                    "contact {} already has an active conversation",
                    conversation.contact_id()
                ),
            ));
        }
        conversations.insert(conversation.contact_id(), conversation.clone());
        Ok(())
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), DomainError> {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(&conversation.contact_id()) {
            Some(slot) => {
                *slot = conversation.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::ConversationNotFound,
                format!("no conversation for contact {}", conversation.contact_id()),
            )),
        }
    }

    async fn find_by_contact(
        &self,
        contact_id: ContactId,
    ) -> Result<Option<Conversation>, DomainError> {
        Ok(self.conversations.read().await.get(&contact_id).cloned())
    }

    async fn delete(&self, contact_id: ContactId) -> Result<bool, DomainError> {
        Ok(self.conversations.write().await.remove(&contact_id).is_some())
    }

    async fn find_expired(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Conversation>, DomainError> {
        let mut expired: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|c| c.expires_at());
        expired.truncate(limit as usize);
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs)
    }

    #[tokio::test]
    async fn one_conversation_per_contact() {
        let repo = InMemoryConversationRepository::new();
        let contact = ContactId::new();
        repo.insert(&Conversation::start(contact, t(0), t(10)))
            .await
            .unwrap();
        let err = repo
            .insert(&Conversation::start(contact, t(1), t(10)))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConversationExists);
    }

    #[tokio::test]
    async fn delete_frees_the_slot() {
        let repo = InMemoryConversationRepository::new();
        let contact = ContactId::new();
        repo.insert(&Conversation::start(contact, t(0), t(10)))
            .await
            .unwrap();
        assert!(repo.delete(contact).await.unwrap());
        assert!(!repo.delete(contact).await.unwrap());
        repo.insert(&Conversation::start(contact, t(1), t(10)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_conversations_oldest_first() {
        let repo = InMemoryConversationRepository::new();
        let a = Conversation::start(ContactId::new(), t(0), t(20));
        let b = Conversation::start(ContactId::new(), t(0), t(10));
        let c = Conversation::start(ContactId::new(), t(0), t(90));
        for conv in [&a, &b, &c] {
            repo.insert(conv).await.unwrap();
        }
        let expired = repo.find_expired(t(50), 10).await.unwrap();
        let contacts: Vec<_> = expired.iter().map(|c| c.contact_id()).collect();
        assert_eq!(contacts, vec![b.contact_id(), a.contact_id()]);
    }
}
