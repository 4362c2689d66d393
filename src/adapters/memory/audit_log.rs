//! In-memory audit log.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{ContactId, DomainError};
use crate::ports::{AuditEntry, AuditKind, AuditLog};

#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn count_of(&self, kind: AuditKind) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), DomainError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn entries_for(&self, contact_id: ContactId) -> Result<Vec<AuditEntry>, DomainError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.contact_id == Some(contact_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    #[tokio::test]
    async fn entries_are_filtered_by_contact() {
        let log = InMemoryAuditLog::new();
        let contact = ContactId::new();
        let now = Timestamp::now();
        log.record(AuditEntry::for_contact(AuditKind::StaleEvent, contact, "old", now))
            .await
            .unwrap();
        log.record(AuditEntry::system(AuditKind::CapacityExhausted, "none left", now))
            .await
            .unwrap();

        assert_eq!(log.entries_for(contact).await.unwrap().len(), 1);
        assert_eq!(log.count_of(AuditKind::CapacityExhausted).await, 1);
        assert_eq!(log.entries().await.len(), 2);
    }
}
