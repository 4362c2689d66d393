//! PostgreSQL implementation of ProfileRepository.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::PgPool;

use super::{
    column, counter, db_error, is_unique_violation, optional_timestamp, timestamp, to_datetime,
    to_i32,
};
use crate::domain::foundation::{DomainError, ErrorCode, ProfileId};
use crate::domain::profile::{AutomationProfile, ProfileParts};
use crate::ports::ProfileRepository;

const SELECT_PROFILE: &str = r#"
    SELECT id, handle, active, is_banned, banned_at, total_uses, successful_uses,
           failed_uses, daily_actions, daily_actions_date, max_daily_actions,
           last_used_at, last_health_check_at, created_at
    FROM profiles
"#;

#[derive(Clone)]
pub struct PostgresProfileRepository {
    pool: PgPool,
}

impl PostgresProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PostgresProfileRepository {
    async fn insert(&self, profile: &AutomationProfile) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO profiles (
                id, handle, active, is_banned, banned_at, total_uses, successful_uses,
                failed_uses, daily_actions, daily_actions_date, max_daily_actions,
                last_used_at, last_health_check_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(profile.id().as_uuid())
        .bind(profile.handle())
        .bind(profile.is_active())
        .bind(profile.is_banned())
        .bind(to_datetime(profile.banned_at()))
        .bind(to_i32(profile.total_uses()))
        .bind(to_i32(profile.successful_uses()))
        .bind(to_i32(profile.failed_uses()))
        .bind(to_i32(profile.daily_actions()))
        .bind(profile.daily_actions_date())
        .bind(to_i32(profile.max_daily_actions()))
        .bind(to_datetime(profile.last_used_at()))
        .bind(to_datetime(profile.last_health_check_at()))
        .bind(profile.created_at().as_datetime())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("profile handle '{}' is already registered", profile.handle()),
            )),
            Err(e) => Err(db_error("insert profile")(e)),
        }
    }

    async fn update(&self, profile: &AutomationProfile) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE profiles SET
                active = $2,
                is_banned = $3,
                banned_at = $4,
                total_uses = $5,
                successful_uses = $6,
                failed_uses = $7,
                daily_actions = $8,
                daily_actions_date = $9,
                max_daily_actions = $10,
                last_used_at = $11,
                last_health_check_at = $12
            WHERE id = $1
            "#,
        )
        .bind(profile.id().as_uuid())
        .bind(profile.is_active())
        .bind(profile.is_banned())
        .bind(to_datetime(profile.banned_at()))
        .bind(to_i32(profile.total_uses()))
        .bind(to_i32(profile.successful_uses()))
        .bind(to_i32(profile.failed_uses()))
        .bind(to_i32(profile.daily_actions()))
        .bind(profile.daily_actions_date())
        .bind(to_i32(profile.max_daily_actions()))
        .bind(to_datetime(profile.last_used_at()))
        .bind(to_datetime(profile.last_health_check_at()))
        .execute(&self.pool)
        .await
        .map_err(db_error("update profile"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::ProfileNotFound,
                format!("Profile not found: {}", profile.id()),
            ));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: ProfileId) -> Result<Option<AutomationProfile>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_PROFILE))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch profile"))?;

        row.as_ref().map(row_to_profile).transpose()
    }

    async fn list(&self) -> Result<Vec<AutomationProfile>, DomainError> {
        let rows = sqlx::query(&format!("{} ORDER BY created_at ASC", SELECT_PROFILE))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list profiles"))?;

        rows.iter().map(row_to_profile).collect()
    }
}

fn row_to_profile(row: &PgRow) -> Result<AutomationProfile, DomainError> {
    Ok(AutomationProfile::reconstitute(ProfileParts {
        id: ProfileId::from_uuid(column(row, "id")?),
        handle: column(row, "handle")?,
        active: column(row, "active")?,
        is_banned: column(row, "is_banned")?,
        banned_at: optional_timestamp(row, "banned_at")?,
        total_uses: counter(row, "total_uses")?,
        successful_uses: counter(row, "successful_uses")?,
        failed_uses: counter(row, "failed_uses")?,
        daily_actions: counter(row, "daily_actions")?,
        daily_actions_date: column::<Option<NaiveDate>>(row, "daily_actions_date")?,
        max_daily_actions: counter(row, "max_daily_actions")?,
        last_used_at: optional_timestamp(row, "last_used_at")?,
        last_health_check_at: optional_timestamp(row, "last_health_check_at")?,
        created_at: timestamp(row, "created_at")?,
    }))
}
