//! Home alarm entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{AlarmStatus, HomeAlarm, SirenStatus};
use sqlx::FromRow;

/// Database enum for alarm_status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "alarm_status", rename_all = "snake_case")]
pub enum AlarmStatusDb {
    Disarmed,
    Arming,
    Armed,
    Disarming,
    Triggered,
}

impl From<AlarmStatusDb> for AlarmStatus {
    fn from(db: AlarmStatusDb) -> Self {
        match db {
            AlarmStatusDb::Disarmed => Self::Disarmed,
            AlarmStatusDb::Arming => Self::Arming,
            AlarmStatusDb::Armed => Self::Armed,
            AlarmStatusDb::Disarming => Self::Disarming,
            AlarmStatusDb::Triggered => Self::Triggered,
        }
    }
}

impl From<AlarmStatus> for AlarmStatusDb {
    fn from(status: AlarmStatus) -> Self {
        match status {
            AlarmStatus::Disarmed => Self::Disarmed,
            AlarmStatus::Arming => Self::Arming,
            AlarmStatus::Armed => Self::Armed,
            AlarmStatus::Disarming => Self::Disarming,
            AlarmStatus::Triggered => Self::Triggered,
        }
    }
}

/// Database enum for siren_status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "siren_status", rename_all = "snake_case")]
pub enum SirenStatusDb {
    Off,
    On,
    Manual,
}

impl From<SirenStatusDb> for SirenStatus {
    fn from(db: SirenStatusDb) -> Self {
        match db {
            SirenStatusDb::Off => Self::Off,
            SirenStatusDb::On => Self::On,
            SirenStatusDb::Manual => Self::Manual,
        }
    }
}

impl From<SirenStatus> for SirenStatusDb {
    fn from(status: SirenStatus) -> Self {
        match status {
            SirenStatus::Off => Self::Off,
            SirenStatus::On => Self::On,
            SirenStatus::Manual => Self::Manual,
        }
    }
}

/// Database row mapping for the home_alarm table.
#[derive(Debug, Clone, FromRow)]
pub struct HomeAlarmEntity {
    pub id: i16,
    pub status: AlarmStatusDb,
    pub siren_status: SirenStatusDb,
    pub siren_state: i16,
    pub tamper_triggered: bool,
    pub tamper_state: i16,
    pub auto_arm_enabled: bool,
    pub last_armed_by: Option<i64>,
    pub last_armed_at: Option<DateTime<Utc>>,
    pub last_disarmed_by: Option<i64>,
    pub last_disarmed_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub last_device_contact_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<HomeAlarmEntity> for HomeAlarm {
    fn from(entity: HomeAlarmEntity) -> Self {
        Self {
            status: entity.status.into(),
            siren_status: entity.siren_status.into(),
            siren_state: entity.siren_state,
            tamper_triggered: entity.tamper_triggered,
            tamper_state: entity.tamper_state,
            auto_arm_enabled: entity.auto_arm_enabled,
            last_armed_by: entity.last_armed_by,
            last_armed_at: entity.last_armed_at,
            last_disarmed_by: entity.last_disarmed_by,
            last_disarmed_at: entity.last_disarmed_at,
            triggered_at: entity.triggered_at,
            last_device_contact_at: entity.last_device_contact_at,
            updated_at: entity.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_into_domain() {
        let now = Utc::now();
        let entity = HomeAlarmEntity {
            id: 1,
            status: AlarmStatusDb::Triggered,
            siren_status: SirenStatusDb::On,
            siren_state: 1,
            tamper_triggered: false,
            tamper_state: 0,
            auto_arm_enabled: true,
            last_armed_by: Some(42),
            last_armed_at: Some(now),
            last_disarmed_by: None,
            last_disarmed_at: None,
            triggered_at: Some(now),
            last_device_contact_at: None,
            updated_at: now,
        };
        let alarm: HomeAlarm = entity.into();
        assert_eq!(alarm.status, AlarmStatus::Triggered);
        assert_eq!(alarm.siren_status, SirenStatus::On);
        assert_eq!(alarm.last_armed_by, Some(42));
        assert!(alarm.is_consistent());
    }

    #[test]
    fn test_status_conversions_are_symmetric() {
        for status in [
            AlarmStatus::Disarmed,
            AlarmStatus::Arming,
            AlarmStatus::Armed,
            AlarmStatus::Disarming,
            AlarmStatus::Triggered,
        ] {
            assert_eq!(AlarmStatus::from(AlarmStatusDb::from(status)), status);
        }
    }
}
