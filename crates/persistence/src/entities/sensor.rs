//! Sensor entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the home_alarm_sensors table.
#[derive(Debug, Clone, FromRow)]
pub struct SensorEntity {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub sensor_type: String,
    pub enabled: bool,
    pub triggered: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SensorEntity> for domain::models::Sensor {
    fn from(entity: SensorEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            location: entity.location,
            sensor_type: entity.sensor_type,
            enabled: entity.enabled,
            triggered: entity.triggered,
            last_triggered_at: entity.last_triggered_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
