//! Sensor repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{CreateSensorRequest, Sensor, SensorTrigger, UpdateSensorRequest};
use domain::services::SensorStore;
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::SensorEntity;
use crate::error::store_error;
use crate::metrics::QueryTimer;

const SENSOR_COLUMNS: &str =
    "id, name, location, sensor_type, enabled, triggered, last_triggered_at, created_at, updated_at";

/// Repository for alarm sensors.
#[derive(Debug, Clone)]
pub struct SensorRepository {
    pool: PgPool,
}

impl SensorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SensorStore for SensorRepository {
    async fn list(&self) -> Result<Vec<Sensor>, StoreError> {
        let timer = QueryTimer::start("list_sensors");
        let sql = format!(
            "SELECT {} FROM home_alarm_sensors ORDER BY name, id",
            SENSOR_COLUMNS
        );
        let rows = sqlx::query_as::<_, SensorEntity>(&sql)
            .fetch_all(&self.pool)
            .await;
        timer.finish();
        Ok(rows
            .map_err(store_error)?
            .into_iter()
            .map(Sensor::from)
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Sensor>, StoreError> {
        let sql = format!("SELECT {} FROM home_alarm_sensors WHERE id = $1", SENSOR_COLUMNS);
        let row = sqlx::query_as::<_, SensorEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(Sensor::from))
    }

    async fn create(
        &self,
        request: &CreateSensorRequest,
        now: DateTime<Utc>,
    ) -> Result<Sensor, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO home_alarm_sensors (id, name, location, sensor_type, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {}
            "#,
            SENSOR_COLUMNS
        );
        let row = sqlx::query_as::<_, SensorEntity>(&sql)
            .bind(&request.id)
            .bind(&request.name)
            .bind(&request.location)
            .bind(&request.sensor_type)
            .bind(request.enabled)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match store_error(e) {
                StoreError::Duplicate(_) => {
                    StoreError::Duplicate(format!("Sensor {} already exists", request.id))
                }
                other => other,
            })?;
        Ok(row.into())
    }

    async fn update(
        &self,
        id: &str,
        request: &UpdateSensorRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError> {
        let sql = format!(
            r#"
            UPDATE home_alarm_sensors
            SET name = COALESCE($2, name),
                location = COALESCE($3, location),
                sensor_type = COALESCE($4, sensor_type),
                updated_at = $5
            WHERE id = $1
            RETURNING {}
            "#,
            SENSOR_COLUMNS
        );
        let row = sqlx::query_as::<_, SensorEntity>(&sql)
            .bind(id)
            .bind(&request.name)
            .bind(&request.location)
            .bind(&request.sensor_type)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(Sensor::from))
    }

    async fn set_enabled(
        &self,
        id: &str,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError> {
        let sql = format!(
            "UPDATE home_alarm_sensors SET enabled = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            SENSOR_COLUMNS
        );
        let row = sqlx::query_as::<_, SensorEntity>(&sql)
            .bind(id)
            .bind(enabled)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(Sensor::from))
    }

    async fn record_trigger(
        &self,
        id: &str,
        triggered: bool,
        now: DateTime<Utc>,
        dedup_window: chrono::Duration,
    ) -> Result<Option<SensorTrigger>, StoreError> {
        let timer = QueryTimer::start("record_sensor_trigger");
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let sql = format!(
            "SELECT {} FROM home_alarm_sensors WHERE id = $1 FOR UPDATE",
            SENSOR_COLUMNS
        );
        let Some(current) = sqlx::query_as::<_, SensorEntity>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?
            .map(Sensor::from)
        else {
            return Ok(None);
        };

        let Some(next) = current.with_report(triggered, now, dedup_window) else {
            return Ok(Some(SensorTrigger {
                sensor: current,
                duplicate: true,
            }));
        };

        sqlx::query(
            r#"
            UPDATE home_alarm_sensors
            SET triggered = $2, last_triggered_at = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.triggered)
        .bind(next.last_triggered_at)
        .bind(next.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        timer.finish();

        Ok(Some(SensorTrigger {
            sensor: next,
            duplicate: false,
        }))
    }

    async fn record_telemetry(
        &self,
        id: &str,
        triggered: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError> {
        let sql = format!(
            "UPDATE home_alarm_sensors SET triggered = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            SENSOR_COLUMNS
        );
        let row = sqlx::query_as::<_, SensorEntity>(&sql)
            .bind(id)
            .bind(triggered)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(Sensor::from))
    }

    async fn clear_triggered(&self, now: DateTime<Utc>) -> Result<Vec<Sensor>, StoreError> {
        let sql = format!(
            "UPDATE home_alarm_sensors SET triggered = FALSE, updated_at = $1 WHERE triggered RETURNING {}",
            SENSOR_COLUMNS
        );
        let rows = sqlx::query_as::<_, SensorEntity>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Sensor::from).collect())
    }
}
