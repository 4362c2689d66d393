//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the broker to external systems:
//! - `memory` - in-memory repositories and audit log
//! - `postgres` - PostgreSQL repositories and audit log (sqlx)
//! - `events` - in-process event bus
//! - `alerting` - operational alert sinks
//! - `http` - REST API (axum)

pub mod alerting;
pub mod events;
pub mod http;
pub mod memory;
pub mod postgres;

pub use alerting::TracingAlertSink;
pub use events::InMemoryEventBus;
