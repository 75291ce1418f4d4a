//! Domain models for the home alarm.

pub mod alarm;
pub mod command;
pub mod event;
pub mod history;
pub mod push;
pub mod schedule;
pub mod sensor;

pub use alarm::{AlarmStatus, HomeAlarm, SirenStatus};
pub use command::{
    CommandStatus, CommandValue, ConfirmCommandRequest, DeviceCommand, NewDeviceCommand,
    OutboundCommand, OutboxPurge, PollResponse,
};
pub use event::{
    Actor, ActorRole, AuthenticatedDevice, BridgeEvent, DeviceStatusReport, DeviceTrigger,
    DeviceTriggerPayload, OperatorAction, SensorDataPayload,
};
pub use history::{
    HistoryEntry, HistoryEventType, NewHistoryEntry, NewSecurityEvent, SecurityEvent,
    SecurityLevel,
};
pub use push::{PushFrame, PushGroup, PushMessage};
pub use schedule::{Schedule, ScheduleAction, ScheduleRequest};
pub use sensor::{CreateSensorRequest, EnabledRequest, Sensor, SensorTrigger, UpdateSensorRequest};
