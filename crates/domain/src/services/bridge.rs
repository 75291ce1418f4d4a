//! Transport bridge.
//!
//! Operator calls, device HTTP callbacks and pub/sub messages all become a
//! [`BridgeEvent`] and go through [`TransportBridge::apply_transition`].
//!
//! Ordering for every event:
//! 1. authorize (operator events) or validate the payload
//! 2. commit the aggregate change as one atomic write
//! 3. run side effects: history, live push, pub/sub publish, outbox enqueue
//!
//! A failed commit returns `Internal` and skips step 3. Side effect failures
//! are logged and never reach the caller. A sensor report writes the sensor
//! row first and the aggregate second, so a crash in between leaves the sensor
//! marked without a siren activation.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::authorization::{authorize, record_success, GuardedAction};
use super::outbox::CommandOutbox;
use super::ports::{AlarmStore, AuditStore, CommandPublisher, PushBroadcaster, SensorStore};
use super::state_machine::{detect_drift, AlarmMutation, AlarmTransition, DeviceObservation};
use crate::error::{AlarmError, StoreError};
use crate::models::{
    Actor, AuthenticatedDevice, BridgeEvent, CommandValue, DeviceCommand, DeviceStatusReport,
    DeviceTrigger, DeviceTriggerPayload, HistoryEntry, HistoryEventType, HomeAlarm,
    NewHistoryEntry, OperatorAction, OutboundCommand, PushMessage, Sensor, SensorDataPayload,
};

/// Bridge tunables.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Device that physically executes operator commands.
    pub central_device_id: String,
    /// Repeated sensor reports with the same value inside this window are
    /// dropped. Zero disables the check.
    pub trigger_dedup_window: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            central_device_id: "home_alarm_central_001".to_string(),
            trigger_dedup_window: Duration::milliseconds(2000),
        }
    }
}

/// Result of one applied event.
#[derive(Debug, Clone)]
pub struct BridgeOutcome {
    /// Aggregate after the event.
    pub alarm: HomeAlarm,
    /// Sensor touched by the event, if any.
    pub sensor: Option<Sensor>,
    /// The event repeated a recent report and changed nothing.
    pub duplicate: bool,
}

impl BridgeOutcome {
    fn alarm(alarm: HomeAlarm) -> Self {
        Self {
            alarm,
            sensor: None,
            duplicate: false,
        }
    }
}

#[derive(Clone)]
pub struct TransportBridge {
    alarm: Arc<dyn AlarmStore>,
    sensors: Arc<dyn SensorStore>,
    audit: Arc<dyn AuditStore>,
    outbox: CommandOutbox,
    push: Arc<dyn PushBroadcaster>,
    publisher: Option<Arc<dyn CommandPublisher>>,
    settings: BridgeSettings,
}

impl TransportBridge {
    pub fn new(
        alarm: Arc<dyn AlarmStore>,
        sensors: Arc<dyn SensorStore>,
        audit: Arc<dyn AuditStore>,
        outbox: CommandOutbox,
        push: Arc<dyn PushBroadcaster>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            alarm,
            sensors,
            audit,
            outbox,
            push,
            publisher: None,
            settings,
        }
    }

    /// Enables best-effort pub/sub delivery next to the outbox.
    pub fn with_publisher(mut self, publisher: Arc<dyn CommandPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn outbox(&self) -> &CommandOutbox {
        &self.outbox
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub async fn current_state(&self) -> Result<HomeAlarm, AlarmError> {
        Ok(self.alarm.load().await?)
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<HistoryEntry>, AlarmError> {
        Ok(self.audit.recent(limit).await?)
    }

    /// Recent outbox entries for one device. Admin only.
    pub async fn recent_commands(
        &self,
        actor: &Actor,
        origin: Option<IpAddr>,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceCommand>, AlarmError> {
        authorize(
            self.audit.as_ref(),
            actor,
            GuardedAction::InspectOutbox,
            origin,
        )
        .await?;
        self.outbox.recent(device_id, limit).await
    }

    pub async fn on_operator_command(
        &self,
        action: OperatorAction,
        actor: Actor,
        origin: Option<IpAddr>,
    ) -> Result<HomeAlarm, AlarmError> {
        let outcome = self
            .apply_transition(BridgeEvent::Operator {
                action,
                actor,
                origin,
            })
            .await?;
        Ok(outcome.alarm)
    }

    pub async fn on_device_status_report(
        &self,
        device: AuthenticatedDevice,
        report: DeviceStatusReport,
    ) -> Result<HomeAlarm, AlarmError> {
        let outcome = self
            .apply_transition(BridgeEvent::DeviceStatus { device, report })
            .await?;
        Ok(outcome.alarm)
    }

    pub async fn on_device_trigger(
        &self,
        device: AuthenticatedDevice,
        payload: DeviceTriggerPayload,
    ) -> Result<BridgeOutcome, AlarmError> {
        self.apply_transition(BridgeEvent::DeviceTrigger { device, payload })
            .await
    }

    pub async fn on_device_heartbeat(
        &self,
        device: AuthenticatedDevice,
        report: DeviceStatusReport,
    ) -> Result<HomeAlarm, AlarmError> {
        let outcome = self
            .apply_transition(BridgeEvent::DeviceHeartbeat { device, report })
            .await?;
        Ok(outcome.alarm)
    }

    pub async fn on_sensor_data(
        &self,
        device: AuthenticatedDevice,
        payload: SensorDataPayload,
    ) -> Result<BridgeOutcome, AlarmError> {
        self.apply_transition(BridgeEvent::SensorData { device, payload })
            .await
    }

    /// Applies one event from any transport.
    pub async fn apply_transition(&self, event: BridgeEvent) -> Result<BridgeOutcome, AlarmError> {
        let kind = event.kind();
        let result = match event {
            BridgeEvent::Operator {
                action,
                actor,
                origin,
            } => self.apply_operator(action, actor, origin).await,
            BridgeEvent::DeviceStatus { device, report } => {
                self.apply_status_report(&device, report).await
            }
            BridgeEvent::DeviceTrigger { device, payload } => {
                self.apply_trigger(&device, payload).await
            }
            BridgeEvent::DeviceHeartbeat { device, report } => {
                self.apply_heartbeat(&device, report).await
            }
            BridgeEvent::SensorData { device, payload } => {
                self.apply_sensor_data(&device, payload).await
            }
        };

        let outcome = match &result {
            Ok(o) if o.duplicate => "duplicate",
            Ok(_) => "applied",
            Err(_) => "rejected",
        };
        metrics::counter!("bridge_events_total", "kind" => kind, "outcome" => outcome).increment(1);
        result
    }

    async fn apply_operator(
        &self,
        action: OperatorAction,
        actor: Actor,
        origin: Option<IpAddr>,
    ) -> Result<BridgeOutcome, AlarmError> {
        authorize(
            self.audit.as_ref(),
            &actor,
            GuardedAction::Operator(action),
            origin,
        )
        .await?;

        let now = Utc::now();
        let transition = self.commit(operator_mutation(action, actor.id), now).await?;

        info!(
            action = action.name(),
            actor_id = ?actor.id,
            role = %actor.role,
            status = %transition.after.status,
            siren = %transition.after.siren_status,
            "Operator command applied"
        );

        let cleared = if action == OperatorAction::Disarm {
            match self.sensors.clear_triggered(now).await {
                Ok(cleared) => cleared,
                Err(e) => {
                    error!(error = %e, "Failed to clear triggered sensors after disarm");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        record_success(self.audit.as_ref(), &actor, action, origin).await;

        let (event_type, message) = operator_history(action);
        self.append_history(
            NewHistoryEntry::new(event_type, message)
                .user(actor.id)
                .metadata(json!({
                    "role": actor.role,
                    "origin": origin.map(|ip| ip.to_string()),
                })),
        )
        .await;

        self.push.broadcast(PushMessage::status(&transition.after));
        self.push
            .broadcast(PushMessage::security_event(event_type, message, None, now));
        for sensor in &cleared {
            self.push.broadcast(PushMessage::sensor_updated(sensor));
        }

        if let Some((command, value)) = device_command(action) {
            self.dispatch_command(
                command,
                value,
                json!({ "actor_id": actor.id, "action": action.name() }),
            )
            .await;
        }

        Ok(BridgeOutcome::alarm(transition.after))
    }

    async fn apply_status_report(
        &self,
        device: &AuthenticatedDevice,
        report: DeviceStatusReport,
    ) -> Result<BridgeOutcome, AlarmError> {
        let observed = DeviceObservation::from(&report);
        let now = Utc::now();
        let transition = self
            .commit(AlarmMutation::DeviceReport(observed.clone()), now)
            .await?;

        debug!(
            device_id = %device.device_id(),
            status = %transition.after.status,
            "Device status report applied"
        );

        let drift = detect_drift(&transition.before, &observed);
        if !drift.is_empty() {
            warn!(
                device_id = %device.device_id(),
                fields = ?drift,
                "Device state differs from stored state"
            );
            self.append_history(
                NewHistoryEntry::new(
                    HistoryEventType::StateDrift,
                    format!("Central unit reported a different {}", drift.join(" and ")),
                )
                .metadata(json!({
                    "device_id": device.device_id(),
                    "fields": drift,
                    "stored": {
                        "tamper_triggered": transition.before.tamper_triggered,
                        "siren_status": transition.before.siren_status,
                    },
                    "reported": {
                        "tamper_triggered": observed.tamper_triggered,
                        "siren_active": observed.siren_active,
                    },
                })),
            )
            .await;
        }

        self.push.broadcast(PushMessage::central_status(
            device.device_id(),
            json!(report),
            now,
        ));
        self.push.broadcast(PushMessage::status(&transition.after));

        Ok(BridgeOutcome::alarm(transition.after))
    }

    async fn apply_trigger(
        &self,
        device: &AuthenticatedDevice,
        payload: DeviceTriggerPayload,
    ) -> Result<BridgeOutcome, AlarmError> {
        match payload.classify()? {
            DeviceTrigger::Sensor {
                sensor_id,
                sensor_name,
                triggered,
            } => {
                self.apply_sensor_trigger(device, &payload, &sensor_id, sensor_name, triggered)
                    .await
            }
            DeviceTrigger::Tamper { active, state } => {
                self.apply_tamper(device, &payload, active, state).await
            }
        }
    }

    async fn apply_sensor_trigger(
        &self,
        device: &AuthenticatedDevice,
        payload: &DeviceTriggerPayload,
        sensor_id: &str,
        sensor_name: Option<String>,
        triggered: bool,
    ) -> Result<BridgeOutcome, AlarmError> {
        let now = Utc::now();
        let recorded = self
            .sensors
            .record_trigger(sensor_id, triggered, now, self.settings.trigger_dedup_window)
            .await
            .map_err(|e| store_failure("sensor_trigger", e))?
            .ok_or_else(|| AlarmError::NotFound(format!("Sensor {} not found", sensor_id)))?;

        // Runs for repeated reports too; only history and push are deduplicated.
        let sensor = recorded.sensor;
        let transition = self
            .commit(
                AlarmMutation::SensorTrip {
                    triggered,
                    sensor_enabled: sensor.enabled,
                },
                now,
            )
            .await?;

        if recorded.duplicate && !transition.entered_triggered() {
            debug!(
                device_id = %device.device_id(),
                sensor_id = %sensor_id,
                triggered,
                "Dropping repeated sensor report"
            );
            return Ok(BridgeOutcome {
                alarm: transition.after,
                sensor: Some(sensor),
                duplicate: true,
            });
        }

        let name = sensor_name.unwrap_or_else(|| sensor.name.clone());
        let (event_type, default_message) = if triggered {
            (
                HistoryEventType::SensorTriggered,
                format!("Sensor {} triggered", name),
            )
        } else {
            (
                HistoryEventType::SensorRestored,
                format!("Sensor {} restored", name),
            )
        };
        let message = payload.message.clone().unwrap_or(default_message);

        if transition.entered_triggered() {
            warn!(sensor_id = %sensor.id, "Alarm triggered");
        } else {
            info!(sensor_id = %sensor.id, triggered, status = %transition.after.status, "Sensor report applied");
        }

        self.append_history(
            NewHistoryEntry::new(event_type, message.clone())
                .sensor(sensor.id.clone())
                .metadata(json!({
                    "device_id": device.device_id(),
                    "sensor_enabled": sensor.enabled,
                    "alarm_status": transition.after.status,
                })),
        )
        .await;

        self.push
            .broadcast(PushMessage::trigger(device.device_id(), json!(payload), now));
        self.push.broadcast(PushMessage::sensor_updated(&sensor));
        self.push.broadcast(PushMessage::security_event(
            event_type,
            &message,
            Some(&sensor.id),
            now,
        ));
        if transition.before != transition.after {
            self.push.broadcast(PushMessage::status(&transition.after));
        }

        Ok(BridgeOutcome {
            alarm: transition.after,
            sensor: Some(sensor),
            duplicate: false,
        })
    }

    async fn apply_tamper(
        &self,
        device: &AuthenticatedDevice,
        payload: &DeviceTriggerPayload,
        active: bool,
        state: i16,
    ) -> Result<BridgeOutcome, AlarmError> {
        let now = Utc::now();
        let transition = self.commit(AlarmMutation::Tamper { active, state }, now).await?;

        let (event_type, default_message) = if active {
            (HistoryEventType::TamperActivated, "Tamper switch activated")
        } else {
            (HistoryEventType::TamperRestored, "Tamper switch restored")
        };
        let message = payload
            .message
            .clone()
            .unwrap_or_else(|| default_message.to_string());

        warn!(device_id = %device.device_id(), active, state, "Tamper event");

        self.append_history(
            NewHistoryEntry::new(event_type, message.clone()).metadata(json!({
                "device_id": device.device_id(),
                "tamper_state": state,
            })),
        )
        .await;

        self.push
            .broadcast(PushMessage::trigger(device.device_id(), json!(payload), now));
        self.push
            .broadcast(PushMessage::security_event(event_type, &message, None, now));
        self.push.broadcast(PushMessage::status(&transition.after));

        Ok(BridgeOutcome::alarm(transition.after))
    }

    async fn apply_heartbeat(
        &self,
        device: &AuthenticatedDevice,
        report: DeviceStatusReport,
    ) -> Result<BridgeOutcome, AlarmError> {
        let now = Utc::now();
        let transition = self
            .commit(
                AlarmMutation::Heartbeat {
                    siren_state: report.siren_state,
                    tamper_state: report.tamper_state,
                },
                now,
            )
            .await?;

        self.push.broadcast(PushMessage::heartbeat(
            device.device_id(),
            json!(report),
            now,
        ));
        if transition.before.siren_state != transition.after.siren_state
            || transition.before.tamper_state != transition.after.tamper_state
        {
            self.push.broadcast(PushMessage::status(&transition.after));
        }

        Ok(BridgeOutcome::alarm(transition.after))
    }

    async fn apply_sensor_data(
        &self,
        device: &AuthenticatedDevice,
        payload: SensorDataPayload,
    ) -> Result<BridgeOutcome, AlarmError> {
        let sensor_id = payload
            .sensor_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AlarmError::Validation("sensor_id is required".to_string()))?;
        let now = Utc::now();

        let sensor = match payload.triggered {
            Some(triggered) => {
                self.sensors
                    .record_telemetry(&sensor_id, triggered, now)
                    .await
                    .map_err(|e| store_failure("sensor_data", e))?
            }
            None => self.sensors.get(&sensor_id).await?,
        }
        .ok_or_else(|| AlarmError::NotFound(format!("Sensor {} not found", sensor_id)))?;

        self.push.broadcast(PushMessage::sensor_data(
            device.device_id(),
            json!(payload),
            now,
        ));
        if payload.triggered.is_some() {
            self.push.broadcast(PushMessage::sensor_updated(&sensor));
        }

        let alarm = self.alarm.load().await?;
        Ok(BridgeOutcome {
            alarm,
            sensor: Some(sensor),
            duplicate: false,
        })
    }

    async fn commit(
        &self,
        mutation: AlarmMutation,
        now: DateTime<Utc>,
    ) -> Result<AlarmTransition, AlarmError> {
        self.alarm
            .apply(&mutation, now)
            .await
            .map_err(|e| store_failure(mutation.name(), e))
    }

    async fn append_history(&self, entry: NewHistoryEntry) {
        if let Err(e) = self.audit.append(&entry, Utc::now()).await {
            error!(
                error = %e,
                event_type = %entry.event_type,
                "Failed to append alarm history entry"
            );
        }
    }

    /// Publishes on pub/sub and enqueues in the outbox concurrently.
    async fn dispatch_command(&self, command: &str, value: CommandValue, metadata: serde_json::Value) {
        let device_id = self.settings.central_device_id.as_str();
        let prepared = self.outbox.prepare(device_id, command, value, Some(metadata));
        let outbound = OutboundCommand::from(&prepared);

        let publish = async {
            let Some(publisher) = &self.publisher else {
                return;
            };
            if let Err(e) = publisher.publish(device_id, &outbound).await {
                metrics::counter!("command_publish_failures_total").increment(1);
                warn!(
                    error = %e,
                    device_id = %device_id,
                    command = %outbound.command,
                    "Pub/sub publish failed, device will get the command by polling"
                );
            }
        };

        let (_, queued) = tokio::join!(publish, self.outbox.enqueue_prepared(&prepared));
        if let Err(e) = queued {
            error!(
                error = %e,
                device_id = %device_id,
                command = %command,
                "Failed to enqueue device command"
            );
        }
    }
}

fn store_failure(operation: &str, err: StoreError) -> AlarmError {
    match &err {
        StoreError::Rejected(reason) => info!(operation, reason = %reason, "Transition rejected"),
        _ => error!(operation, error = %err, "Store write failed, event not applied"),
    }
    err.into()
}

fn operator_mutation(action: OperatorAction, actor_id: Option<i64>) -> AlarmMutation {
    match action {
        OperatorAction::Arm => AlarmMutation::Arm { actor_id },
        OperatorAction::Disarm => AlarmMutation::Disarm { actor_id },
        OperatorAction::SirenOn => AlarmMutation::SirenManual,
        OperatorAction::SirenOff => AlarmMutation::SirenOff,
        OperatorAction::ResetTamper => AlarmMutation::ResetTamper,
        OperatorAction::SetAutoArm(enabled) => AlarmMutation::SetAutoArm(enabled),
    }
}

fn operator_history(action: OperatorAction) -> (HistoryEventType, &'static str) {
    match action {
        OperatorAction::Arm => (HistoryEventType::Armed, "Alarm armed"),
        OperatorAction::Disarm => (HistoryEventType::Disarmed, "Alarm disarmed"),
        OperatorAction::SirenOn => (HistoryEventType::SirenOn, "Siren activated manually"),
        OperatorAction::SirenOff => (HistoryEventType::SirenOff, "Siren deactivated"),
        OperatorAction::ResetTamper => (HistoryEventType::TamperReset, "Tamper state reset"),
        OperatorAction::SetAutoArm(true) => (HistoryEventType::AutoArmEnabled, "Auto-arm enabled"),
        OperatorAction::SetAutoArm(false) => {
            (HistoryEventType::AutoArmDisabled, "Auto-arm disabled")
        }
    }
}

/// Command the central unit runs for an operator action.
fn device_command(action: OperatorAction) -> Option<(&'static str, CommandValue)> {
    match action {
        OperatorAction::Arm => Some(("arm", CommandValue::Bool(true))),
        OperatorAction::Disarm => Some(("disarm", CommandValue::Bool(false))),
        OperatorAction::SirenOn => Some(("siren", CommandValue::Bool(true))),
        OperatorAction::SirenOff => Some(("siren", CommandValue::Bool(false))),
        OperatorAction::ResetTamper => Some(("reset_tamper", CommandValue::Bool(false))),
        OperatorAction::SetAutoArm(_) => None,
    }
}
