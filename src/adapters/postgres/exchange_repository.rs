//! PostgreSQL implementation of ExchangeRepository.
//!
//! Proposals, terms and the execution records are JSONB; the transcript is
//! one JSONB array per exchange.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;

use super::{
    column, db_error, from_json, optional_timestamp, parse, timestamp, to_datetime, to_i64,
    to_json,
};
use crate::domain::exchange::{Exchange, ExchangeParts, Party};
use crate::domain::foundation::{ContactId, DomainError, ErrorCode, ExchangeId, Timestamp};
use crate::ports::ExchangeRepository;

const SELECT_EXCHANGE: &str = r#"
    SELECT id, contact_id, initiator, our_video_url, their_video_url,
           our_proposal, their_proposal, terms, status, failure_reason,
           execution, verification, transcript,
           initiated_at, agreed_at, closed_at, timeout_at, updated_at
    FROM exchanges
"#;

/// Statuses an exchange can still time out from.
const OPEN_STATUSES: &str =
    "('initiated', 'negotiating', 'agreed', 'my_turn_done', 'their_turn_done')";

#[derive(Clone)]
pub struct PostgresExchangeRepository {
    pool: PgPool,
}

impl PostgresExchangeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExchangeRepository for PostgresExchangeRepository {
    async fn insert(&self, exchange: &Exchange) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO exchanges (
                id, contact_id, initiator, our_video_url, their_video_url,
                our_proposal, their_proposal, terms, status, failure_reason,
                execution, verification, transcript,
                initiated_at, agreed_at, closed_at, timeout_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18
            )
            "#,
        )
        .bind(exchange.id().as_uuid())
        .bind(exchange.contact_id().as_uuid())
        .bind(exchange.initiator().as_str())
        .bind(exchange.video_url(Party::Us))
        .bind(exchange.video_url(Party::Them))
        .bind(to_json(&exchange.proposal(Party::Us), "our_proposal")?)
        .bind(to_json(&exchange.proposal(Party::Them), "their_proposal")?)
        .bind(to_json(&exchange.terms(), "terms")?)
        .bind(exchange.status().as_str())
        .bind(exchange.failure_reason())
        .bind(to_json(&exchange.execution(), "execution")?)
        .bind(to_json(&exchange.verification(), "verification")?)
        .bind(to_json(&exchange.transcript(), "transcript")?)
        .bind(exchange.initiated_at().as_datetime())
        .bind(to_datetime(exchange.agreed_at()))
        .bind(to_datetime(exchange.closed_at()))
        .bind(exchange.timeout_at().as_datetime())
        .bind(exchange.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("insert exchange"))?;

        Ok(())
    }

    async fn update(&self, exchange: &Exchange) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE exchanges SET
                our_video_url = $2,
                their_video_url = $3,
                our_proposal = $4,
                their_proposal = $5,
                terms = $6,
                status = $7,
                failure_reason = $8,
                execution = $9,
                verification = $10,
                transcript = $11,
                agreed_at = $12,
                closed_at = $13,
                timeout_at = $14,
                updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(exchange.id().as_uuid())
        .bind(exchange.video_url(Party::Us))
        .bind(exchange.video_url(Party::Them))
        .bind(to_json(&exchange.proposal(Party::Us), "our_proposal")?)
        .bind(to_json(&exchange.proposal(Party::Them), "their_proposal")?)
        .bind(to_json(&exchange.terms(), "terms")?)
        .bind(exchange.status().as_str())
        .bind(exchange.failure_reason())
        .bind(to_json(&exchange.execution(), "execution")?)
        .bind(to_json(&exchange.verification(), "verification")?)
        .bind(to_json(&exchange.transcript(), "transcript")?)
        .bind(to_datetime(exchange.agreed_at()))
        .bind(to_datetime(exchange.closed_at()))
        .bind(exchange.timeout_at().as_datetime())
        .bind(exchange.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("update exchange"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::ExchangeNotFound,
                format!("Exchange not found: {}", exchange.id()),
            ));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: ExchangeId) -> Result<Option<Exchange>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_EXCHANGE))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch exchange"))?;

        row.as_ref().map(row_to_exchange).transpose()
    }

    async fn find_by_contact(&self, contact_id: ContactId) -> Result<Vec<Exchange>, DomainError> {
        let rows = sqlx::query(&format!(
            "{} WHERE contact_id = $1 ORDER BY initiated_at DESC",
            SELECT_EXCHANGE
        ))
        .bind(contact_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch exchanges for contact"))?;

        rows.iter().map(row_to_exchange).collect()
    }

    async fn find_overdue(&self, now: Timestamp, limit: u32) -> Result<Vec<Exchange>, DomainError> {
        let rows = sqlx::query(&format!(
            "{} WHERE status IN {} AND timeout_at <= $1 ORDER BY timeout_at ASC LIMIT $2",
            SELECT_EXCHANGE, OPEN_STATUSES
        ))
        .bind(now.as_datetime())
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch overdue exchanges"))?;

        rows.iter().map(row_to_exchange).collect()
    }
}

fn row_to_exchange(row: &PgRow) -> Result<Exchange, DomainError> {
    Ok(Exchange::reconstitute(ExchangeParts {
        id: ExchangeId::from_uuid(column(row, "id")?),
        contact_id: ContactId::from_uuid(column(row, "contact_id")?),
        initiator: parse(row, "initiator")?,
        our_video_url: column(row, "our_video_url")?,
        their_video_url: column(row, "their_video_url")?,
        our_proposal: from_json(row, "our_proposal")?,
        their_proposal: from_json(row, "their_proposal")?,
        terms: from_json(row, "terms")?,
        status: parse(row, "status")?,
        failure_reason: column(row, "failure_reason")?,
        execution: from_json(row, "execution")?,
        verification: from_json(row, "verification")?,
        transcript: from_json(row, "transcript")?,
        initiated_at: timestamp(row, "initiated_at")?,
        agreed_at: optional_timestamp(row, "agreed_at")?,
        closed_at: optional_timestamp(row, "closed_at")?,
        timeout_at: timestamp(row, "timeout_at")?,
        updated_at: timestamp(row, "updated_at")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exchange::ExchangeStatus;

    #[test]
    fn open_statuses_exclude_every_terminal_status() {
        for status in [
            ExchangeStatus::Completed,
            ExchangeStatus::Failed,
            ExchangeStatus::NoResponse,
            ExchangeStatus::PartnerDidNotComplete,
        ] {
            assert!(!OPEN_STATUSES.contains(&format!("'{}'", status.as_str())));
        }
    }

    #[test]
    fn open_statuses_include_every_live_status() {
        for status in [
            ExchangeStatus::Initiated,
            ExchangeStatus::Negotiating,
            ExchangeStatus::Agreed,
            ExchangeStatus::MyTurnDone,
            ExchangeStatus::TheirTurnDone,
        ] {
            assert!(OPEN_STATUSES.contains(&format!("'{}'", status.as_str())));
        }
    }
}
