//! PostgreSQL implementation of AuditLog. Append-only.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;

use super::{column, db_error, timestamp};
use crate::domain::foundation::{ContactId, DomainError};
use crate::ports::{AuditEntry, AuditKind, AuditLog};

#[derive(Clone)]
pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, kind, contact_id, detail, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(entry.kind.as_str())
        .bind(entry.contact_id.map(|id| *id.as_uuid()))
        .bind(&entry.detail)
        .bind(entry.recorded_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("record audit entry"))?;

        Ok(())
    }

    async fn entries_for(&self, contact_id: ContactId) -> Result<Vec<AuditEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT kind, contact_id, detail, recorded_at
            FROM audit_log
            WHERE contact_id = $1
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(contact_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch audit entries"))?;

        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &PgRow) -> Result<AuditEntry, DomainError> {
    let kind: String = column(row, "kind")?;
    let contact_id: Option<uuid::Uuid> = column(row, "contact_id")?;

    Ok(AuditEntry {
        kind: kind_from_str(&kind)?,
        contact_id: contact_id.map(ContactId::from_uuid),
        detail: column(row, "detail")?,
        recorded_at: timestamp(row, "recorded_at")?,
    })
}

fn kind_from_str(s: &str) -> Result<AuditKind, DomainError> {
    match s {
        "invalid_transition" => Ok(AuditKind::InvalidTransition),
        "stale_event" => Ok(AuditKind::StaleEvent),
        "blocked" => Ok(AuditKind::Blocked),
        "unblocked" => Ok(AuditKind::Unblocked),
        "capacity_exhausted" => Ok(AuditKind::CapacityExhausted),
        other => Err(DomainError::database(format!("Invalid audit kind: {}", other))),
    }
}
