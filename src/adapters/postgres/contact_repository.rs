//! PostgreSQL implementation of ContactRepository.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use std::collections::BTreeSet;

use super::{
    column, counter, db_error, from_json, is_unique_violation, optional_timestamp, parse,
    parse_optional, timestamp, to_datetime, to_i32, to_i64, to_json,
};
use crate::domain::contact::{Contact, ContactIdentity, ContactParts, RelaunchCriteria};
use crate::domain::foundation::{ContactId, DomainError, ErrorCode, Timestamp};
use crate::domain::reliability::{ExchangeTally, ReliabilityScore};
use crate::ports::ContactRepository;

const SELECT_CONTACT: &str = r#"
    SELECT id, platform, external_user_id, discovery, status, status_before_block,
           block_reason, flag_reason, reliability_score, total_exchanges,
           successful_exchanges, failed_exchanges, preferences, tags,
           first_contact_at, last_contact_at, last_response_at, last_exchange_at,
           created_at, updated_at
    FROM contacts
"#;

#[derive(Clone)]
pub struct PostgresContactRepository {
    pool: PgPool,
}

impl PostgresContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for PostgresContactRepository {
    async fn insert(&self, contact: &Contact) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO contacts (
                id, platform, external_user_id, discovery, status, status_before_block,
                block_reason, flag_reason, reliability_score, total_exchanges,
                successful_exchanges, failed_exchanges, preferences, tags,
                first_contact_at, last_contact_at, last_response_at, last_exchange_at,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            "#,
        )
        .bind(contact.id().as_uuid())
        .bind(contact.identity().platform().as_str())
        .bind(contact.identity().external_user_id())
        .bind(to_json(contact.discovery(), "discovery")?)
        .bind(contact.status().as_str())
        .bind(contact.status_before_block().map(|s| s.as_str()))
        .bind(contact.block_reason())
        .bind(contact.flag_reason())
        .bind(i16::from(contact.reliability_score().value()))
        .bind(to_i32(contact.tally().total))
        .bind(to_i32(contact.tally().successful))
        .bind(to_i32(contact.tally().failed))
        .bind(to_json(contact.preferences(), "preferences")?)
        .bind(contact.tags().iter().cloned().collect::<Vec<String>>())
        .bind(to_datetime(contact.first_contact_at()))
        .bind(to_datetime(contact.last_contact_at()))
        .bind(to_datetime(contact.last_response_at()))
        .bind(to_datetime(contact.last_exchange_at()))
        .bind(contact.created_at().as_datetime())
        .bind(contact.updated_at().as_datetime())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DomainError::new(
                ErrorCode::ContactExists,
                format!("Contact already exists: {}", contact.identity()),
            )),
            Err(e) => Err(db_error("insert contact")(e)),
        }
    }

    async fn update(&self, contact: &Contact) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE contacts SET
                discovery = $2,
                status = $3,
                status_before_block = $4,
                block_reason = $5,
                flag_reason = $6,
                reliability_score = $7,
                total_exchanges = $8,
                successful_exchanges = $9,
                failed_exchanges = $10,
                preferences = $11,
                tags = $12,
                first_contact_at = $13,
                last_contact_at = $14,
                last_response_at = $15,
                last_exchange_at = $16,
                updated_at = $17
            WHERE id = $1
            "#,
        )
        .bind(contact.id().as_uuid())
        .bind(to_json(contact.discovery(), "discovery")?)
        .bind(contact.status().as_str())
        .bind(contact.status_before_block().map(|s| s.as_str()))
        .bind(contact.block_reason())
        .bind(contact.flag_reason())
        .bind(i16::from(contact.reliability_score().value()))
        .bind(to_i32(contact.tally().total))
        .bind(to_i32(contact.tally().successful))
        .bind(to_i32(contact.tally().failed))
        .bind(to_json(contact.preferences(), "preferences")?)
        .bind(contact.tags().iter().cloned().collect::<Vec<String>>())
        .bind(to_datetime(contact.first_contact_at()))
        .bind(to_datetime(contact.last_contact_at()))
        .bind(to_datetime(contact.last_response_at()))
        .bind(to_datetime(contact.last_exchange_at()))
        .bind(contact.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("update contact"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::ContactNotFound,
                format!("Contact not found: {}", contact.id()),
            ));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: ContactId) -> Result<Option<Contact>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_CONTACT))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch contact"))?;

        row.as_ref().map(row_to_contact).transpose()
    }

    async fn find_by_identity(
        &self,
        identity: &ContactIdentity,
    ) -> Result<Option<Contact>, DomainError> {
        let row = sqlx::query(&format!(
            "{} WHERE platform = $1 AND external_user_id = $2",
            SELECT_CONTACT
        ))
        .bind(identity.platform().as_str())
        .bind(identity.external_user_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch contact by identity"))?;

        row.as_ref().map(row_to_contact).transpose()
    }

    async fn find_relaunch_candidates(
        &self,
        criteria: &RelaunchCriteria,
        limit: u32,
    ) -> Result<Vec<Contact>, DomainError> {
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE status <> 'blocked'
              AND reliability_score >= $1
              AND successful_exchanges >= $2
              AND (last_exchange_at IS NULL OR last_exchange_at < $3)
            ORDER BY reliability_score DESC, successful_exchanges DESC
            LIMIT $4
            "#,
            SELECT_CONTACT
        ))
        .bind(i16::from(criteria.min_score))
        .bind(to_i32(criteria.min_successful))
        .bind(criteria.cooldown_cutoff.as_datetime())
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch relaunch candidates"))?;

        rows.iter().map(row_to_contact).collect()
    }

    async fn find_recompute_due(
        &self,
        idle_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<ContactId>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM contacts
            WHERE status <> 'blocked'
              AND (
                flag_reason IS NOT NULL
                OR (
                  status IN ('contacted', 'responded')
                  AND COALESCE(
                    GREATEST(last_contact_at, last_response_at, last_exchange_at),
                    created_at
                  ) < $1
                )
              )
            ORDER BY COALESCE(
              GREATEST(last_contact_at, last_response_at, last_exchange_at),
              created_at
            )
            LIMIT $2
            "#,
        )
        .bind(idle_before.as_datetime())
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch contacts due for recompute"))?;

        rows.iter()
            .map(|row| column(row, "id").map(ContactId::from_uuid))
            .collect()
    }
}

fn row_to_contact(row: &PgRow) -> Result<Contact, DomainError> {
    let platform: String = column(row, "platform")?;
    let external_user_id: String = column(row, "external_user_id")?;
    let identity = ContactIdentity::new(platform, external_user_id)
        .map_err(|e| DomainError::database(format!("Invalid contact identity: {}", e)))?;

    let score: i16 = column(row, "reliability_score")?;
    let reliability_score = u8::try_from(score)
        .ok()
        .and_then(|s| ReliabilityScore::new(s).ok())
        .ok_or_else(|| DomainError::database(format!("Invalid reliability_score: {}", score)))?;

    let tags: Vec<String> = column(row, "tags")?;

    Ok(Contact::reconstitute(ContactParts {
        id: ContactId::from_uuid(column(row, "id")?),
        identity,
        discovery: from_json(row, "discovery")?,
        status: parse(row, "status")?,
        status_before_block: parse_optional(row, "status_before_block")?,
        block_reason: column(row, "block_reason")?,
        flag_reason: column(row, "flag_reason")?,
        reliability_score,
        tally: ExchangeTally {
            total: counter(row, "total_exchanges")?,
            successful: counter(row, "successful_exchanges")?,
            failed: counter(row, "failed_exchanges")?,
        },
        preferences: from_json(row, "preferences")?,
        tags: tags.into_iter().collect::<BTreeSet<String>>(),
        first_contact_at: optional_timestamp(row, "first_contact_at")?,
        last_contact_at: optional_timestamp(row, "last_contact_at")?,
        last_response_at: optional_timestamp(row, "last_response_at")?,
        last_exchange_at: optional_timestamp(row, "last_exchange_at")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    }))
}
