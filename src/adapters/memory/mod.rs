//! In-memory adapters for every persistence port.
//!
//! Used by tests and when no database is configured. State lives only as
//! long as the process.

mod audit_log;
mod contact_repository;
mod conversation_repository;
mod exchange_repository;
mod profile_repository;

pub use audit_log::InMemoryAuditLog;
pub use contact_repository::InMemoryContactRepository;
pub use conversation_repository::InMemoryConversationRepository;
pub use exchange_repository::InMemoryExchangeRepository;
pub use profile_repository::InMemoryProfileRepository;
