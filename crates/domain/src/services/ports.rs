//! Store and notification ports.
//!
//! The persistence crate implements the stores on PostgreSQL, the api crate
//! implements the publisher on MQTT. [`super::memory`] holds in-process
//! versions of all of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::state_machine::{AlarmMutation, AlarmTransition};
use crate::error::StoreError;
use crate::models::{
    CreateSensorRequest, DeviceCommand, HistoryEntry, HomeAlarm, NewDeviceCommand,
    NewHistoryEntry, NewSecurityEvent, OutboundCommand, OutboxPurge, PushMessage, Schedule,
    ScheduleRequest, SecurityEvent, Sensor, SensorTrigger, UpdateSensorRequest,
};

/// The singleton alarm record.
#[async_trait]
pub trait AlarmStore: Send + Sync {
    async fn load(&self) -> Result<HomeAlarm, StoreError>;

    /// Applies `mutation` as one atomic read-modify-write.
    async fn apply(
        &self,
        mutation: &AlarmMutation,
        now: DateTime<Utc>,
    ) -> Result<AlarmTransition, StoreError>;
}

/// Sensor registry scoped to the alarm.
#[async_trait]
pub trait SensorStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Sensor>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Sensor>, StoreError>;

    async fn create(
        &self,
        request: &CreateSensorRequest,
        now: DateTime<Utc>,
    ) -> Result<Sensor, StoreError>;

    async fn update(
        &self,
        id: &str,
        request: &UpdateSensorRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError>;

    async fn set_enabled(
        &self,
        id: &str,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError>;

    /// Records a discrete trigger report on one sensor atomically.
    ///
    /// Returns `None` for an unknown sensor. An activation repeating one
    /// recorded within `dedup_window` is returned with `duplicate = true`
    /// and leaves the row untouched.
    async fn record_trigger(
        &self,
        id: &str,
        triggered: bool,
        now: DateTime<Utc>,
        dedup_window: chrono::Duration,
    ) -> Result<Option<SensorTrigger>, StoreError>;

    /// Records a raw telemetry reading. Never moves `last_triggered_at`.
    async fn record_telemetry(
        &self,
        id: &str,
        triggered: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError>;

    /// Clears `triggered` on every sensor, returning the ones that changed.
    async fn clear_triggered(&self, now: DateTime<Utc>) -> Result<Vec<Sensor>, StoreError>;
}

/// Auto-arm schedule storage.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Schedule>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Schedule>, StoreError>;

    async fn create(
        &self,
        request: &ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Schedule, StoreError>;

    async fn update(
        &self,
        id: i64,
        request: &ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Schedule>, StoreError>;

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Schedule>, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}

/// Durable per-device command queue.
#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn insert(
        &self,
        command: &NewDeviceCommand,
        now: DateTime<Utc>,
    ) -> Result<DeviceCommand, StoreError>;

    /// Atomically claims the oldest deliverable pending command.
    async fn claim_next(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCommand>, StoreError>;

    /// Moves a `sent` command to `executed` or `failed`. Returns whether a
    /// row changed.
    async fn mark_result(
        &self,
        id: Uuid,
        device_id: &str,
        executed: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn list_for_device(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceCommand>, StoreError>;

    /// Marks overdue pending rows expired and deletes rows created before
    /// `retain_after`.
    async fn purge(
        &self,
        retain_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<OutboxPurge, StoreError>;
}

/// Append-only alarm history and security log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(
        &self,
        entry: &NewHistoryEntry,
        now: DateTime<Utc>,
    ) -> Result<HistoryEntry, StoreError>;

    /// Most recent entries first.
    async fn recent(&self, limit: i64) -> Result<Vec<HistoryEntry>, StoreError>;

    async fn append_security(
        &self,
        event: &NewSecurityEvent,
        now: DateTime<Utc>,
    ) -> Result<SecurityEvent, StoreError>;

    async fn recent_security(&self, limit: i64) -> Result<Vec<SecurityEvent>, StoreError>;
}

/// Fan-out to live clients. Must never block.
pub trait PushBroadcaster: Send + Sync {
    fn broadcast(&self, message: PushMessage);
}

/// Failure of a pub/sub publish attempt.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish timed out after {0} ms")]
    Timeout(u64),

    #[error("Publish failed: {0}")]
    Channel(String),
}

/// Best-effort command delivery over the pub/sub channel.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, device_id: &str, command: &OutboundCommand)
        -> Result<(), PublishError>;
}
