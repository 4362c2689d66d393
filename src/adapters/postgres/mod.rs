//! PostgreSQL adapters - database implementations of the persistence ports.
//!
//! - `PostgresContactRepository` - contacts, unique on (platform, external id)
//! - `PostgresExchangeRepository` - exchanges with JSONB terms and transcript
//! - `PostgresConversationRepository` - one row per contact
//! - `PostgresProfileRepository` - automation profiles
//! - `PostgresAuditLog` - append-only audit entries
//!
//! Nested value objects are stored as JSONB; schema lives in `migrations/`.

mod audit_log;
mod contact_repository;
mod conversation_repository;
mod exchange_repository;
mod profile_repository;

pub use audit_log::PostgresAuditLog;
pub use contact_repository::PostgresContactRepository;
pub use conversation_repository::PostgresConversationRepository;
pub use exchange_repository::PostgresExchangeRepository;
pub use profile_repository::PostgresProfileRepository;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

/// Runs the embedded migrations against `pool`.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to run migrations: {}", e)))
}

// ════════════════════════════════════════════════════════════════════════════
// Helper functions
// ════════════════════════════════════════════════════════════════════════════

fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::database(format!("Failed to {}: {}", action, e))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| DomainError::database(format!("Failed to get {}: {}", name, e)))
}

fn timestamp(row: &PgRow, name: &str) -> Result<Timestamp, DomainError> {
    column::<DateTime<Utc>>(row, name).map(Timestamp::from_datetime)
}

fn optional_timestamp(row: &PgRow, name: &str) -> Result<Option<Timestamp>, DomainError> {
    Ok(column::<Option<DateTime<Utc>>>(row, name)?.map(Timestamp::from_datetime))
}

fn to_datetime(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

fn to_json<T: Serialize>(value: &T, name: &str) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(value).map_err(|e| {
        DomainError::new(
            ErrorCode::InternalError,
            format!("Failed to encode {}: {}", name, e),
        )
    })
}

fn from_json<T: DeserializeOwned>(row: &PgRow, name: &str) -> Result<T, DomainError> {
    let value: serde_json::Value = column(row, name)?;
    serde_json::from_value(value)
        .map_err(|e| DomainError::database(format!("Invalid {}: {}", name, e)))
}

/// Parses a text column into a domain enum.
fn parse<T>(row: &PgRow, name: &str) -> Result<T, DomainError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = column(row, name)?;
    raw.parse()
        .map_err(|e| DomainError::database(format!("Invalid {} '{}': {}", name, raw, e)))
}

fn parse_optional<T>(row: &PgRow, name: &str) -> Result<Option<T>, DomainError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = column(row, name)?;
    raw.map(|raw| {
        raw.parse()
            .map_err(|e| DomainError::database(format!("Invalid {} '{}': {}", name, raw, e)))
    })
    .transpose()
}

/// Counters are stored as INTEGER; negative values are treated as corrupt.
fn counter(row: &PgRow, name: &str) -> Result<u32, DomainError> {
    let value: i32 = column(row, name)?;
    u32::try_from(value)
        .map_err(|_| DomainError::database(format!("Negative {}: {}", name, value)))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_i64(value: u32) -> i64 {
    i64::from(value)
}
