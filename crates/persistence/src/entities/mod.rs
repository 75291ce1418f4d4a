//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod alarm_history;
pub mod device_command;
pub mod home_alarm;
pub mod schedule;
pub mod sensor;

pub use alarm_history::{AlarmHistoryEntity, SecurityLogEntity};
pub use device_command::{DeviceCommandEntity, DeviceCommandStatusDb};
pub use home_alarm::{AlarmStatusDb, HomeAlarmEntity, SirenStatusDb};
pub use schedule::{ScheduleActionDb, ScheduleEntity};
pub use sensor::SensorEntity;
