//! PostgreSQL implementation of ConversationRepository.
//!
//! Keyed by contact: the primary key enforces one live conversation each.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;

use super::{
    column, db_error, from_json, is_unique_violation, parse, parse_optional, timestamp, to_i64,
    to_json,
};
use crate::domain::conversation::{Conversation, ConversationParts};
use crate::domain::foundation::{
    ContactId, ConversationId, DomainError, ErrorCode, ExchangeId, Timestamp,
};
use crate::ports::ConversationRepository;

const SELECT_CONVERSATION: &str = r#"
    SELECT id, contact_id, exchange_id, phase, previous_phase, context,
           entered_at, expires_at, last_event_at, created_at
    FROM conversations
"#;

#[derive(Clone)]
pub struct PostgresConversationRepository {
    pool: PgPool,
}

impl PostgresConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PostgresConversationRepository {
    async fn insert(&self, conversation: &Conversation) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO conversations (
                id, contact_id, exchange_id, phase, previous_phase, context,
                entered_at, expires_at, last_event_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(conversation.id().as_uuid())
        .bind(conversation.contact_id().as_uuid())
        .bind(conversation.exchange_id().map(|id| *id.as_uuid()))
        .bind(conversation.phase().as_str())
        .bind(conversation.previous_phase().map(|p| p.as_str()))
        .bind(to_json(conversation.context(), "context")?)
        .bind(conversation.entered_at().as_datetime())
        .bind(conversation.expires_at().as_datetime())
        .bind(conversation.last_event_at().as_datetime())
        .bind(conversation.created_at().as_datetime())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DomainError::new(
                ErrorCode::ConversationExists,
                format!(
                    "Contact {} already has an active conversation",
                    conversation.contact_id()
                ),
            )),
            Err(e) => Err(db_error("insert conversation")(e)),
        }
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations SET
                exchange_id = $2,
                phase = $3,
                previous_phase = $4,
                context = $5,
                entered_at = $6,
                expires_at = $7,
                last_event_at = $8
            WHERE contact_id = $1
            "#,
        )
        .bind(conversation.contact_id().as_uuid())
        .bind(conversation.exchange_id().map(|id| *id.as_uuid()))
        .bind(conversation.phase().as_str())
        .bind(conversation.previous_phase().map(|p| p.as_str()))
        .bind(to_json(conversation.context(), "context")?)
        .bind(conversation.entered_at().as_datetime())
        .bind(conversation.expires_at().as_datetime())
        .bind(conversation.last_event_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("update conversation"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::ConversationNotFound,
                format!("No conversation for contact {}", conversation.contact_id()),
            ));
        }
        Ok(())
    }

    async fn find_by_contact(
        &self,
        contact_id: ContactId,
    ) -> Result<Option<Conversation>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE contact_id = $1", SELECT_CONVERSATION))
            .bind(contact_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch conversation"))?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn delete(&self, contact_id: ContactId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM conversations WHERE contact_id = $1")
            .bind(contact_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error("delete conversation"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_expired(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Conversation>, DomainError> {
        let rows = sqlx::query(&format!(
            "{} WHERE expires_at <= $1 ORDER BY expires_at ASC LIMIT $2",
            SELECT_CONVERSATION
        ))
        .bind(now.as_datetime())
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch expired conversations"))?;

        rows.iter().map(row_to_conversation).collect()
    }
}

fn row_to_conversation(row: &PgRow) -> Result<Conversation, DomainError> {
    let exchange_id: Option<uuid::Uuid> = column(row, "exchange_id")?;

    Ok(Conversation::reconstitute(ConversationParts {
        id: ConversationId::from_uuid(column(row, "id")?),
        contact_id: ContactId::from_uuid(column(row, "contact_id")?),
        exchange_id: exchange_id.map(ExchangeId::from_uuid),
        phase: parse(row, "phase")?,
        previous_phase: parse_optional(row, "previous_phase")?,
        context: from_json(row, "context")?,
        entered_at: timestamp(row, "entered_at")?,
        expires_at: timestamp(row, "expires_at")?,
        last_event_at: timestamp(row, "last_event_at")?,
        created_at: timestamp(row, "created_at")?,
    }))
}
