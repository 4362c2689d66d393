//! Exchange repository port.

use async_trait::async_trait;

use crate::domain::exchange::Exchange;
use crate::domain::foundation::{ContactId, DomainError, ExchangeId, Timestamp};

#[async_trait]
pub trait ExchangeRepository: Send + Sync {
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, exchange: &Exchange) -> Result<(), DomainError>;

    /// # Errors
    ///
    /// - `ExchangeNotFound` if it was never inserted
    /// - `DatabaseError` on persistence failure
    async fn update(&self, exchange: &Exchange) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: ExchangeId) -> Result<Option<Exchange>, DomainError>;

    /// All exchanges with a contact, newest first.
    async fn find_by_contact(&self, contact_id: ContactId) -> Result<Vec<Exchange>, DomainError>;

    /// Open exchanges whose `timeout_at` is before `now`, oldest deadline first.
    async fn find_overdue(&self, now: Timestamp, limit: u32) -> Result<Vec<Exchange>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn ExchangeRepository) {}
    }
}
