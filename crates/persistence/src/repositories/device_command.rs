//! Device command outbox repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{DeviceCommand, NewDeviceCommand, OutboxPurge};
use domain::services::CommandStore;
use domain::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{DeviceCommandEntity, DeviceCommandStatusDb};
use crate::error::store_error;
use crate::metrics::QueryTimer;

const COMMAND_COLUMNS: &str =
    "id, device_id, command, value, metadata, status, created_at, expires_at, sent_at, executed_at";

/// Repository for queued device commands.
#[derive(Debug, Clone)]
pub struct DeviceCommandRepository {
    pool: PgPool,
}

impl DeviceCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommandStore for DeviceCommandRepository {
    async fn insert(
        &self,
        command: &NewDeviceCommand,
        now: DateTime<Utc>,
    ) -> Result<DeviceCommand, StoreError> {
        let timer = QueryTimer::start("insert_device_command");
        let sql = format!(
            r#"
            INSERT INTO device_commands (id, device_id, command, value, metadata, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            RETURNING {}
            "#,
            COMMAND_COLUMNS
        );
        let row = sqlx::query_as::<_, DeviceCommandEntity>(&sql)
            .bind(command.id)
            .bind(&command.device_id)
            .bind(&command.command)
            .bind(command.value.to_storage())
            .bind(&command.metadata)
            .bind(now)
            .bind(command.expires_at)
            .fetch_one(&self.pool)
            .await;
        timer.finish();
        Ok(row.map_err(store_error)?.into())
    }

    async fn claim_next(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCommand>, StoreError> {
        let timer = QueryTimer::start("claim_device_command");
        // SKIP LOCKED keeps two concurrent polls from claiming the same row.
        let sql = format!(
            r#"
            UPDATE device_commands
            SET status = 'sent', sent_at = $2
            WHERE id = (
                SELECT id FROM device_commands
                WHERE device_id = $1 AND status = 'pending' AND expires_at > $2
                ORDER BY seq
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            COMMAND_COLUMNS
        );
        let row = sqlx::query_as::<_, DeviceCommandEntity>(&sql)
            .bind(device_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await;
        timer.finish();
        Ok(row.map_err(store_error)?.map(DeviceCommand::from))
    }

    async fn mark_result(
        &self,
        id: Uuid,
        device_id: &str,
        executed: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let status = if executed {
            DeviceCommandStatusDb::Executed
        } else {
            DeviceCommandStatusDb::Failed
        };
        let result = sqlx::query(
            r#"
            UPDATE device_commands
            SET status = $3, executed_at = $4
            WHERE id = $1 AND device_id = $2 AND status = 'sent'
            "#,
        )
        .bind(id)
        .bind(device_id)
        .bind(status)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_device(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceCommand>, StoreError> {
        let sql = format!(
            "SELECT {} FROM device_commands WHERE device_id = $1 ORDER BY seq DESC LIMIT $2",
            COMMAND_COLUMNS
        );
        let rows = sqlx::query_as::<_, DeviceCommandEntity>(&sql)
            .bind(device_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(DeviceCommand::from).collect())
    }

    async fn purge(
        &self,
        retain_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<OutboxPurge, StoreError> {
        let timer = QueryTimer::start("purge_device_commands");
        let expired = sqlx::query(
            "UPDATE device_commands SET status = 'expired' WHERE status = 'pending' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .rows_affected();

        let deleted = sqlx::query("DELETE FROM device_commands WHERE created_at < $1")
            .bind(retain_after)
            .execute(&self.pool)
            .await
            .map_err(store_error)?
            .rows_affected();
        timer.finish();

        Ok(OutboxPurge { expired, deleted })
    }
}
