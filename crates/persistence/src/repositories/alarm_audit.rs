//! Alarm history and security log repository. Both tables are append-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{HistoryEntry, NewHistoryEntry, NewSecurityEvent, SecurityEvent};
use domain::services::AuditStore;
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::{AlarmHistoryEntity, SecurityLogEntity};
use crate::error::store_error;

const HISTORY_COLUMNS: &str = "id, event_type, sensor_id, user_id, message, metadata, created_at";
const SECURITY_COLUMNS: &str =
    "id, level, code, message, actor_id, actor_role, origin, metadata, created_at";

#[derive(Debug, Clone)]
pub struct AlarmAuditRepository {
    pool: PgPool,
}

impl AlarmAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for AlarmAuditRepository {
    async fn append(
        &self,
        entry: &NewHistoryEntry,
        now: DateTime<Utc>,
    ) -> Result<HistoryEntry, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO home_alarm_history (event_type, sensor_id, user_id, message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            HISTORY_COLUMNS
        );
        sqlx::query_as::<_, AlarmHistoryEntity>(&sql)
            .bind(entry.event_type.as_str())
            .bind(&entry.sensor_id)
            .bind(entry.user_id)
            .bind(&entry.message)
            .bind(&entry.metadata)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?
            .into_domain()
    }

    async fn recent(&self, limit: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM home_alarm_history ORDER BY created_at DESC, id DESC LIMIT $1",
            HISTORY_COLUMNS
        );
        sqlx::query_as::<_, AlarmHistoryEntity>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(AlarmHistoryEntity::into_domain)
            .collect()
    }

    async fn append_security(
        &self,
        event: &NewSecurityEvent,
        now: DateTime<Utc>,
    ) -> Result<SecurityEvent, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO security_log (level, code, message, actor_id, actor_role, origin, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SECURITY_COLUMNS
        );
        sqlx::query_as::<_, SecurityLogEntity>(&sql)
            .bind(event.level.as_str())
            .bind(&event.code)
            .bind(&event.message)
            .bind(event.actor_id)
            .bind(&event.actor_role)
            .bind(&event.origin)
            .bind(&event.metadata)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?
            .into_domain()
    }

    async fn recent_security(&self, limit: i64) -> Result<Vec<SecurityEvent>, StoreError> {
        let sql = format!(
            "SELECT {} FROM security_log ORDER BY created_at DESC, id DESC LIMIT $1",
            SECURITY_COLUMNS
        );
        sqlx::query_as::<_, SecurityLogEntity>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(SecurityLogEntity::into_domain)
            .collect()
    }
}
