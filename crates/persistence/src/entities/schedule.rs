//! Schedule entity (database row mapping).

use chrono::{DateTime, NaiveTime, Utc};
use domain::models::ScheduleAction;
use sqlx::FromRow;

/// Database enum for schedule_action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "schedule_action", rename_all = "lowercase")]
pub enum ScheduleActionDb {
    Arm,
    Disarm,
}

impl From<ScheduleActionDb> for ScheduleAction {
    fn from(db: ScheduleActionDb) -> Self {
        match db {
            ScheduleActionDb::Arm => Self::Arm,
            ScheduleActionDb::Disarm => Self::Disarm,
        }
    }
}

impl From<ScheduleAction> for ScheduleActionDb {
    fn from(action: ScheduleAction) -> Self {
        match action {
            ScheduleAction::Arm => Self::Arm,
            ScheduleAction::Disarm => Self::Disarm,
        }
    }
}

/// Database row mapping for the home_alarm_schedules table.
#[derive(Debug, Clone, FromRow)]
pub struct ScheduleEntity {
    pub id: i64,
    pub name: String,
    pub action: ScheduleActionDb,
    pub days_of_week: Vec<i16>,
    pub time_of_day: NaiveTime,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ScheduleEntity> for domain::models::Schedule {
    fn from(entity: ScheduleEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            action: entity.action.into(),
            days_of_week: entity.days_of_week,
            time: entity.time_of_day,
            enabled: entity.enabled,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
