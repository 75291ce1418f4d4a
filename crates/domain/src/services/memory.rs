//! In-process store implementations.
//!
//! Backs the `memory` storage backend and the test suites. Each store keeps
//! its state behind one mutex, so every operation is atomic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ports::{
    AlarmStore, AuditStore, CommandPublisher, CommandStore, PublishError, PushBroadcaster,
    ScheduleStore, SensorStore,
};
use super::state_machine::{AlarmMutation, AlarmTransition};
use crate::error::StoreError;
use crate::models::{
    CommandStatus, CreateSensorRequest, DeviceCommand, HistoryEntry, HomeAlarm, NewDeviceCommand,
    NewHistoryEntry, NewSecurityEvent, OutboundCommand, OutboxPurge, PushMessage, Schedule,
    ScheduleRequest, SecurityEvent, Sensor, SensorTrigger, UpdateSensorRequest,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

/// Alarm aggregate held in memory.
#[derive(Debug)]
pub struct InMemoryAlarmStore {
    state: Mutex<HomeAlarm>,
    unavailable: AtomicBool,
}

impl InMemoryAlarmStore {
    pub fn new() -> Self {
        Self::with_state(HomeAlarm::initial(Utc::now()))
    }

    pub fn with_state(alarm: HomeAlarm) -> Self {
        Self {
            state: Mutex::new(alarm),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every write fail, simulating a database outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl Default for InMemoryAlarmStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlarmStore for InMemoryAlarmStore {
    async fn load(&self) -> Result<HomeAlarm, StoreError> {
        Ok(lock(&self.state)?.clone())
    }

    async fn apply(
        &self,
        mutation: &AlarmMutation,
        now: DateTime<Utc>,
    ) -> Result<AlarmTransition, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("alarm store offline".to_string()));
        }
        let mut state = lock(&self.state)?;
        let before = state.clone();
        let after = mutation.apply(&before, now)?;
        *state = after.clone();
        Ok(AlarmTransition { before, after })
    }
}

/// Sensor registry held in memory, ordered by id.
#[derive(Debug, Default)]
pub struct InMemorySensorStore {
    sensors: Mutex<BTreeMap<String, Sensor>>,
}

impl InMemorySensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensors(sensors: impl IntoIterator<Item = Sensor>) -> Self {
        Self {
            sensors: Mutex::new(sensors.into_iter().map(|s| (s.id.clone(), s)).collect()),
        }
    }
}

#[async_trait]
impl SensorStore for InMemorySensorStore {
    async fn list(&self) -> Result<Vec<Sensor>, StoreError> {
        let mut sensors: Vec<Sensor> = lock(&self.sensors)?.values().cloned().collect();
        sensors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sensors)
    }

    async fn get(&self, id: &str) -> Result<Option<Sensor>, StoreError> {
        Ok(lock(&self.sensors)?.get(id).cloned())
    }

    async fn create(
        &self,
        request: &CreateSensorRequest,
        now: DateTime<Utc>,
    ) -> Result<Sensor, StoreError> {
        let mut sensors = lock(&self.sensors)?;
        if sensors.contains_key(&request.id) {
            return Err(StoreError::Duplicate(format!(
                "sensor {} already exists",
                request.id
            )));
        }
        let sensor = Sensor {
            id: request.id.clone(),
            name: request.name.clone(),
            location: request.location.clone(),
            sensor_type: request.sensor_type.clone(),
            enabled: request.enabled,
            triggered: false,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };
        sensors.insert(sensor.id.clone(), sensor.clone());
        Ok(sensor)
    }

    async fn update(
        &self,
        id: &str,
        request: &UpdateSensorRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError> {
        let mut sensors = lock(&self.sensors)?;
        let Some(sensor) = sensors.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = &request.name {
            sensor.name = name.clone();
        }
        if let Some(location) = &request.location {
            sensor.location = Some(location.clone());
        }
        if let Some(sensor_type) = &request.sensor_type {
            sensor.sensor_type = sensor_type.clone();
        }
        sensor.updated_at = now;
        Ok(Some(sensor.clone()))
    }

    async fn set_enabled(
        &self,
        id: &str,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError> {
        let mut sensors = lock(&self.sensors)?;
        Ok(sensors.get_mut(id).map(|sensor| {
            sensor.enabled = enabled;
            sensor.updated_at = now;
            sensor.clone()
        }))
    }

    async fn record_trigger(
        &self,
        id: &str,
        triggered: bool,
        now: DateTime<Utc>,
        dedup_window: chrono::Duration,
    ) -> Result<Option<SensorTrigger>, StoreError> {
        let mut sensors = lock(&self.sensors)?;
        let Some(sensor) = sensors.get_mut(id) else {
            return Ok(None);
        };
        Ok(Some(match sensor.with_report(triggered, now, dedup_window) {
            Some(next) => {
                *sensor = next;
                SensorTrigger {
                    sensor: sensor.clone(),
                    duplicate: false,
                }
            }
            None => SensorTrigger {
                sensor: sensor.clone(),
                duplicate: true,
            },
        }))
    }

    async fn record_telemetry(
        &self,
        id: &str,
        triggered: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Sensor>, StoreError> {
        let mut sensors = lock(&self.sensors)?;
        Ok(sensors.get_mut(id).map(|sensor| {
            *sensor = sensor.with_telemetry(triggered, now);
            sensor.clone()
        }))
    }

    async fn clear_triggered(&self, now: DateTime<Utc>) -> Result<Vec<Sensor>, StoreError> {
        let mut sensors = lock(&self.sensors)?;
        Ok(sensors
            .values_mut()
            .filter(|s| s.triggered)
            .map(|s| {
                s.triggered = false;
                s.updated_at = now;
                s.clone()
            })
            .collect())
    }
}

/// Schedules held in memory.
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    inner: Mutex<(i64, BTreeMap<i64, Schedule>)>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn list(&self) -> Result<Vec<Schedule>, StoreError> {
        let inner = lock(&self.inner)?;
        let mut schedules: Vec<Schedule> = inner.1.values().cloned().collect();
        schedules.sort_by_key(|s| (s.time, s.id));
        Ok(schedules)
    }

    async fn get(&self, id: i64) -> Result<Option<Schedule>, StoreError> {
        Ok(lock(&self.inner)?.1.get(&id).cloned())
    }

    async fn create(
        &self,
        request: &ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Schedule, StoreError> {
        let mut inner = lock(&self.inner)?;
        inner.0 += 1;
        let schedule = Schedule {
            id: inner.0,
            name: request.name.clone(),
            action: request.action,
            days_of_week: request.normalized_days(),
            time: request.time,
            enabled: request.enabled,
            created_at: now,
            updated_at: now,
        };
        inner.1.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn update(
        &self,
        id: i64,
        request: &ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Schedule>, StoreError> {
        let mut inner = lock(&self.inner)?;
        Ok(inner.1.get_mut(&id).map(|schedule| {
            schedule.name = request.name.clone();
            schedule.action = request.action;
            schedule.days_of_week = request.normalized_days();
            schedule.time = request.time;
            schedule.enabled = request.enabled;
            schedule.updated_at = now;
            schedule.clone()
        }))
    }

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Schedule>, StoreError> {
        let mut inner = lock(&self.inner)?;
        Ok(inner.1.get_mut(&id).map(|schedule| {
            schedule.enabled = enabled;
            schedule.updated_at = now;
            schedule.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(lock(&self.inner)?.1.remove(&id).is_some())
    }
}

/// Command outbox held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryCommandStore {
    commands: Mutex<Vec<DeviceCommand>>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn insert(
        &self,
        command: &NewDeviceCommand,
        now: DateTime<Utc>,
    ) -> Result<DeviceCommand, StoreError> {
        let row = DeviceCommand {
            id: command.id,
            device_id: command.device_id.clone(),
            command: command.command.clone(),
            value: command.value.clone(),
            metadata: command.metadata.clone(),
            status: CommandStatus::Pending,
            created_at: now,
            expires_at: command.expires_at,
            sent_at: None,
            executed_at: None,
        };
        lock(&self.commands)?.push(row.clone());
        Ok(row)
    }

    async fn claim_next(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCommand>, StoreError> {
        let mut commands = lock(&self.commands)?;
        Ok(commands
            .iter_mut()
            .find(|c| {
                c.device_id == device_id && c.status == CommandStatus::Pending && c.expires_at > now
            })
            .map(|c| {
                c.status = CommandStatus::Sent;
                c.sent_at = Some(now);
                c.clone()
            }))
    }

    async fn mark_result(
        &self,
        id: Uuid,
        device_id: &str,
        executed: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut commands = lock(&self.commands)?;
        let Some(cmd) = commands
            .iter_mut()
            .find(|c| c.id == id && c.device_id == device_id && c.status == CommandStatus::Sent)
        else {
            return Ok(false);
        };
        cmd.status = if executed {
            CommandStatus::Executed
        } else {
            CommandStatus::Failed
        };
        cmd.executed_at = Some(now);
        Ok(true)
    }

    async fn list_for_device(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceCommand>, StoreError> {
        let commands = lock(&self.commands)?;
        Ok(commands
            .iter()
            .rev()
            .filter(|c| c.device_id == device_id)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn purge(
        &self,
        retain_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<OutboxPurge, StoreError> {
        let mut commands = lock(&self.commands)?;
        let mut purge = OutboxPurge::default();
        for cmd in commands.iter_mut() {
            if cmd.status == CommandStatus::Pending && cmd.expires_at <= now {
                cmd.status = CommandStatus::Expired;
                purge.expired += 1;
            }
        }
        let before = commands.len();
        commands.retain(|c| c.created_at >= retain_after);
        purge.deleted = (before - commands.len()) as u64;
        Ok(purge)
    }
}

/// History and security log held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    history: Mutex<Vec<HistoryEntry>>,
    security: Mutex<Vec<SecurityEvent>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(
        &self,
        entry: &NewHistoryEntry,
        now: DateTime<Utc>,
    ) -> Result<HistoryEntry, StoreError> {
        let mut history = lock(&self.history)?;
        let row = HistoryEntry {
            id: history.len() as i64 + 1,
            event_type: entry.event_type,
            sensor_id: entry.sensor_id.clone(),
            user_id: entry.user_id,
            message: entry.message.clone(),
            metadata: entry.metadata.clone(),
            created_at: now,
        };
        history.push(row.clone());
        Ok(row)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let history = lock(&self.history)?;
        Ok(history
            .iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn append_security(
        &self,
        event: &NewSecurityEvent,
        now: DateTime<Utc>,
    ) -> Result<SecurityEvent, StoreError> {
        let mut security = lock(&self.security)?;
        let row = SecurityEvent {
            id: security.len() as i64 + 1,
            level: event.level,
            code: event.code.clone(),
            message: event.message.clone(),
            actor_id: event.actor_id,
            actor_role: event.actor_role.clone(),
            origin: event.origin.clone(),
            metadata: event.metadata.clone(),
            created_at: now,
        };
        security.push(row.clone());
        Ok(row)
    }

    async fn recent_security(&self, limit: i64) -> Result<Vec<SecurityEvent>, StoreError> {
        let security = lock(&self.security)?;
        Ok(security
            .iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}

/// Broadcaster that keeps every message, for assertions.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    messages: Mutex<Vec<PushMessage>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PushMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.messages().iter().map(|m| m.event).collect()
    }
}

impl PushBroadcaster for RecordingBroadcaster {
    fn broadcast(&self, message: PushMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

/// Publisher that keeps every command, optionally failing each attempt.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, OutboundCommand)>>,
    failing: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn published(&self) -> Vec<(String, OutboundCommand)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandPublisher for RecordingPublisher {
    async fn publish(
        &self,
        device_id: &str,
        command: &OutboundCommand,
    ) -> Result<(), PublishError> {
        if self.failing {
            return Err(PublishError::Channel("broker unreachable".to_string()));
        }
        if let Ok(mut published) = self.published.lock() {
            published.push((device_id.to_string(), command.clone()));
        }
        Ok(())
    }
}
