//! Ports - trait boundaries between the broker core and infrastructure.
//!
//! # Persistence
//!
//! - `ContactRepository`, `ExchangeRepository`, `ConversationRepository`,
//!   `ProfileRepository` - aggregate storage
//!
//! # Side channels
//!
//! - `EventPublisher` - domain event delivery
//! - `AuditLog` - record of rejected and discarded events
//! - `AlertSink` - operator alerts

mod alert_sink;
mod audit_log;
mod contact_repository;
mod conversation_repository;
mod event_publisher;
mod exchange_repository;
mod profile_repository;

pub use alert_sink::{Alert, AlertSink};
pub use audit_log::{AuditEntry, AuditKind, AuditLog};
pub use contact_repository::ContactRepository;
pub use conversation_repository::ConversationRepository;
pub use event_publisher::EventPublisher;
pub use exchange_repository::ExchangeRepository;
pub use profile_repository::ProfileRepository;
