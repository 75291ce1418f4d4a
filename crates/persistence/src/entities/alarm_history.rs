//! Alarm history and security log entities (database row mappings).

use chrono::{DateTime, Utc};
use domain::models::{HistoryEntry, SecurityEvent};
use domain::StoreError;
use sqlx::FromRow;

/// Database row mapping for the home_alarm_history table.
#[derive(Debug, Clone, FromRow)]
pub struct AlarmHistoryEntity {
    pub id: i64,
    pub event_type: String,
    pub sensor_id: Option<String>,
    pub user_id: Option<i64>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AlarmHistoryEntity {
    pub fn into_domain(self) -> Result<HistoryEntry, StoreError> {
        Ok(HistoryEntry {
            id: self.id,
            event_type: self.event_type.parse().map_err(StoreError::Unavailable)?,
            sensor_id: self.sensor_id,
            user_id: self.user_id,
            message: self.message,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

/// Database row mapping for the security_log table.
#[derive(Debug, Clone, FromRow)]
pub struct SecurityLogEntity {
    pub id: i64,
    pub level: String,
    pub code: String,
    pub message: String,
    pub actor_id: Option<i64>,
    pub actor_role: Option<String>,
    pub origin: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl SecurityLogEntity {
    pub fn into_domain(self) -> Result<SecurityEvent, StoreError> {
        Ok(SecurityEvent {
            id: self.id,
            level: self.level.parse().map_err(StoreError::Unavailable)?,
            code: self.code,
            message: self.message,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            origin: self.origin,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}
