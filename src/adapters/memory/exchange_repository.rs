//! In-memory exchange repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::exchange::Exchange;
use crate::domain::foundation::{ContactId, DomainError, ErrorCode, ExchangeId, Timestamp};
use crate::ports::ExchangeRepository;

#[derive(Default)]
pub struct InMemoryExchangeRepository {
    exchanges: RwLock<HashMap<ExchangeId, Exchange>>,
}

impl InMemoryExchangeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExchangeRepository for InMemoryExchangeRepository {
    async fn insert(&self, exchange: &Exchange) -> Result<(), DomainError> {
        self.exchanges
            .write()
            .await
            .insert(exchange.id(), exchange.clone());
        Ok(())
    }

    async fn update(&self, exchange: &Exchange) -> Result<(), DomainError> {
        let mut exchanges = self.exchanges.write().await;
        match exchanges.get_mut(&exchange.id()) {
            Some(slot) => {
                *slot = exchange.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::ExchangeNotFound,
                format!("exchange {} not found", exchange.id()),
            )),
        }
    }

    async fn find_by_id(&self, id: ExchangeId) -> Result<Option<Exchange>, DomainError> {
        Ok(self.exchanges.read().await.get(&id).cloned())
    }

    async fn find_by_contact(&self, contact_id: ContactId) -> Result<Vec<Exchange>, DomainError> {
        let mut found: Vec<Exchange> = self
            .exchanges
            .read()
            .await
            .values()
            .filter(|e| e.contact_id() == contact_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.initiated_at().cmp(&a.initiated_at()));
        Ok(found)
    }

    async fn find_overdue(&self, now: Timestamp, limit: u32) -> Result<Vec<Exchange>, DomainError> {
        let mut overdue: Vec<Exchange> = self
            .exchanges
            .read()
            .await
            .values()
            .filter(|e| e.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|e| e.timeout_at());
        overdue.truncate(limit as usize);
        Ok(overdue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exchange::Party;

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs)
    }

    #[tokio::test]
    async fn overdue_lists_open_exchanges_past_deadline() {
        let repo = InMemoryExchangeRepository::new();
        let contact = ContactId::new();
        let late = Exchange::open(contact, Party::Them, t(10), t(0));
        let later = Exchange::open(contact, Party::Them, t(5), t(0));
        let fresh = Exchange::open(contact, Party::Them, t(500), t(0));
        let mut closed = Exchange::open(contact, Party::Them, t(1), t(0));
        closed.fail("cancelled", t(2)).unwrap();
        for e in [&late, &later, &fresh, &closed] {
            repo.insert(e).await.unwrap();
        }

        let overdue = repo.find_overdue(t(100), 10).await.unwrap();
        let ids: Vec<_> = overdue.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![later.id(), late.id()]);

        assert_eq!(repo.find_overdue(t(100), 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_by_contact_filters() {
        let repo = InMemoryExchangeRepository::new();
        let mine = Exchange::open(ContactId::new(), Party::Us, t(10), t(0));
        repo.insert(&mine).await.unwrap();
        repo.insert(&Exchange::open(ContactId::new(), Party::Us, t(10), t(0)))
            .await
            .unwrap();
        let found = repo.find_by_contact(mine.contact_id()).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
