//! Domain services for the home alarm.
//!
//! The transport bridge owns every alarm state change. The remaining
//! services cover configuration, device authentication and delivery.

pub mod authorization;
pub mod bridge;
pub mod configuration;
pub mod device_auth;
pub mod memory;
pub mod outbox;
pub mod ports;
pub mod push;
pub mod state_machine;

pub use authorization::GuardedAction;
pub use bridge::{BridgeOutcome, BridgeSettings, TransportBridge};
pub use configuration::ConfigurationService;
pub use device_auth::{DeviceAuthError, DeviceAuthGate, DeviceCredentialStore};
pub use outbox::CommandOutbox;
pub use ports::{
    AlarmStore, AuditStore, CommandPublisher, CommandStore, PublishError, PushBroadcaster,
    ScheduleStore, SensorStore,
};
pub use push::{PushHub, PushSubscriber};
pub use state_machine::{AlarmMutation, AlarmTransition, DeviceObservation};
