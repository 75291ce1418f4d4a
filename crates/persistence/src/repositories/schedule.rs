//! Auto-arm schedule repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{Schedule, ScheduleRequest};
use domain::services::ScheduleStore;
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::{ScheduleActionDb, ScheduleEntity};
use crate::error::store_error;

const SCHEDULE_COLUMNS: &str =
    "id, name, action, days_of_week, time_of_day, enabled, created_at, updated_at";

/// Repository for auto-arm schedules.
#[derive(Debug, Clone)]
pub struct ScheduleRepository {
    pool: PgPool,
}

impl ScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for ScheduleRepository {
    async fn list(&self) -> Result<Vec<Schedule>, StoreError> {
        let sql = format!(
            "SELECT {} FROM home_alarm_schedules ORDER BY time_of_day, id",
            SCHEDULE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ScheduleEntity>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Schedule::from).collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Schedule>, StoreError> {
        let sql = format!("SELECT {} FROM home_alarm_schedules WHERE id = $1", SCHEDULE_COLUMNS);
        let row = sqlx::query_as::<_, ScheduleEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(Schedule::from))
    }

    async fn create(
        &self,
        request: &ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Schedule, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO home_alarm_schedules (name, action, days_of_week, time_of_day, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {}
            "#,
            SCHEDULE_COLUMNS
        );
        let row = sqlx::query_as::<_, ScheduleEntity>(&sql)
            .bind(&request.name)
            .bind(ScheduleActionDb::from(request.action))
            .bind(request.normalized_days())
            .bind(request.time)
            .bind(request.enabled)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.into())
    }

    async fn update(
        &self,
        id: i64,
        request: &ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Schedule>, StoreError> {
        let sql = format!(
            r#"
            UPDATE home_alarm_schedules
            SET name = $2, action = $3, days_of_week = $4, time_of_day = $5,
                enabled = $6, updated_at = $7
            WHERE id = $1
            RETURNING {}
            "#,
            SCHEDULE_COLUMNS
        );
        let row = sqlx::query_as::<_, ScheduleEntity>(&sql)
            .bind(id)
            .bind(&request.name)
            .bind(ScheduleActionDb::from(request.action))
            .bind(request.normalized_days())
            .bind(request.time)
            .bind(request.enabled)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(Schedule::from))
    }

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Schedule>, StoreError> {
        let sql = format!(
            "UPDATE home_alarm_schedules SET enabled = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            SCHEDULE_COLUMNS
        );
        let row = sqlx::query_as::<_, ScheduleEntity>(&sql)
            .bind(id)
            .bind(enabled)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(Schedule::from))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM home_alarm_schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }
}
