//! Device command entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{CommandStatus, CommandValue, DeviceCommand};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for device_command_status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "device_command_status", rename_all = "lowercase")]
pub enum DeviceCommandStatusDb {
    Pending,
    Sent,
    Executed,
    Failed,
    Expired,
}

impl From<DeviceCommandStatusDb> for CommandStatus {
    fn from(db: DeviceCommandStatusDb) -> Self {
        match db {
            DeviceCommandStatusDb::Pending => Self::Pending,
            DeviceCommandStatusDb::Sent => Self::Sent,
            DeviceCommandStatusDb::Executed => Self::Executed,
            DeviceCommandStatusDb::Failed => Self::Failed,
            DeviceCommandStatusDb::Expired => Self::Expired,
        }
    }
}

/// Database row mapping for the device_commands table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceCommandEntity {
    pub id: Uuid,
    pub device_id: String,
    pub command: String,
    pub value: String,
    pub metadata: Option<serde_json::Value>,
    pub status: DeviceCommandStatusDb,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl From<DeviceCommandEntity> for DeviceCommand {
    fn from(entity: DeviceCommandEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            command: entity.command,
            value: CommandValue::from_storage(&entity.value),
            metadata: entity.metadata,
            status: entity.status.into(),
            created_at: entity.created_at,
            expires_at: entity.expires_at,
            sent_at: entity.sent_at,
            executed_at: entity.executed_at,
        }
    }
}
