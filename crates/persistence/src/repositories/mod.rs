//! Repository implementations for database operations.

pub mod alarm_audit;
pub mod device_command;
pub mod home_alarm;
pub mod schedule;
pub mod sensor;

pub use alarm_audit::AlarmAuditRepository;
pub use device_command::DeviceCommandRepository;
pub use home_alarm::HomeAlarmRepository;
pub use schedule::ScheduleRepository;
pub use sensor::SensorRepository;
