//! Home alarm repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::HomeAlarm;
use domain::services::{AlarmMutation, AlarmStore, AlarmTransition};
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::{AlarmStatusDb, HomeAlarmEntity, SirenStatusDb};
use crate::error::store_error;
use crate::metrics::QueryTimer;

const SELECT_ALARM: &str = r#"
    SELECT id, status, siren_status, siren_state, tamper_triggered, tamper_state,
        auto_arm_enabled, last_armed_by, last_armed_at, last_disarmed_by,
        last_disarmed_at, triggered_at, last_device_contact_at, updated_at
    FROM home_alarm
    WHERE id = 1
"#;

/// Repository for the singleton alarm row.
#[derive(Debug, Clone)]
pub struct HomeAlarmRepository {
    pool: PgPool,
}

impl HomeAlarmRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlarmStore for HomeAlarmRepository {
    async fn load(&self) -> Result<HomeAlarm, StoreError> {
        let timer = QueryTimer::start("load_home_alarm");
        let result = sqlx::query_as::<_, HomeAlarmEntity>(SELECT_ALARM)
            .fetch_one(&self.pool)
            .await;
        timer.finish();
        Ok(result.map_err(store_error)?.into())
    }

    async fn apply(
        &self,
        mutation: &AlarmMutation,
        now: DateTime<Utc>,
    ) -> Result<AlarmTransition, StoreError> {
        let timer = QueryTimer::start("apply_home_alarm_mutation");
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let locked = format!("{} FOR UPDATE", SELECT_ALARM);
        let before: HomeAlarm = sqlx::query_as::<_, HomeAlarmEntity>(&locked)
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?
            .into();

        // A rejected mutation drops the transaction, which rolls it back.
        let after = mutation.apply(&before, now)?;

        sqlx::query(
            r#"
            UPDATE home_alarm
            SET status = $1,
                siren_status = $2,
                siren_state = $3,
                tamper_triggered = $4,
                tamper_state = $5,
                auto_arm_enabled = $6,
                last_armed_by = $7,
                last_armed_at = $8,
                last_disarmed_by = $9,
                last_disarmed_at = $10,
                triggered_at = $11,
                last_device_contact_at = $12,
                updated_at = $13
            WHERE id = 1
            "#,
        )
        .bind(AlarmStatusDb::from(after.status))
        .bind(SirenStatusDb::from(after.siren_status))
        .bind(after.siren_state)
        .bind(after.tamper_triggered)
        .bind(after.tamper_state)
        .bind(after.auto_arm_enabled)
        .bind(after.last_armed_by)
        .bind(after.last_armed_at)
        .bind(after.last_disarmed_by)
        .bind(after.last_disarmed_at)
        .bind(after.triggered_at)
        .bind(after.last_device_contact_at)
        .bind(after.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        timer.finish();

        tracing::debug!(from = %before.status, to = %after.status, "Home alarm row updated");
        Ok(AlarmTransition { before, after })
    }
}
