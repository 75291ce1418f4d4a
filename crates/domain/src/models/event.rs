//! Events accepted by the transport bridge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::alarm::AlarmStatus;
use crate::error::AlarmError;

/// Role carried by an operator token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Admin,
    Operator,
    Viewer,
    /// The in-process schedule runner.
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Admin => "admin",
            ActorRole::Operator => "operator",
            ActorRole::Viewer => "viewer",
            ActorRole::System => "system",
        }
    }

    /// Parses a role claim. Unknown roles get the least privilege.
    pub fn from_claim(role: &str) -> Self {
        role.parse().unwrap_or(ActorRole::Viewer)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(ActorRole::Admin),
            "operator" => Ok(ActorRole::Operator),
            "viewer" | "user" => Ok(ActorRole::Viewer),
            // Tokens can never claim the system role.
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Who initiated an operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Option<i64>,
    pub role: ActorRole,
}

impl Actor {
    pub fn user(id: i64, role: ActorRole) -> Self {
        Self { id: Some(id), role }
    }

    pub fn scheduler() -> Self {
        Self {
            id: None,
            role: ActorRole::System,
        }
    }
}

/// Operator command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    Arm,
    Disarm,
    SirenOn,
    SirenOff,
    ResetTamper,
    SetAutoArm(bool),
}

impl OperatorAction {
    pub fn name(&self) -> &'static str {
        match self {
            OperatorAction::Arm => "arm",
            OperatorAction::Disarm => "disarm",
            OperatorAction::SirenOn => "siren_on",
            OperatorAction::SirenOff => "siren_off",
            OperatorAction::ResetTamper => "reset_tamper",
            OperatorAction::SetAutoArm(_) => "set_auto_arm",
        }
    }
}

/// A device whose credentials were verified.
///
/// Only the device authentication gate creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedDevice {
    device_id: String,
}

impl AuthenticatedDevice {
    pub(crate) fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Full or partial state report from the central unit.
///
/// Heartbeats use the same shape and only carry the raw codes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStatusReport {
    pub alarm_status: Option<AlarmStatus>,
    /// Older firmware reports a plain armed flag.
    pub alarm_armed: Option<bool>,
    pub siren_active: Option<bool>,
    pub siren_state: Option<i16>,
    pub tamper_triggered: Option<bool>,
    pub tamper_state: Option<i16>,
    pub wifi_rssi: Option<i32>,
    pub uptime: Option<u64>,
    pub free_heap: Option<u64>,
    pub timestamp: Option<serde_json::Value>,
}

impl DeviceStatusReport {
    /// The reported arming status, preferring the explicit field.
    pub fn reported_status(&self) -> Option<AlarmStatus> {
        self.alarm_status.or(match self.alarm_armed {
            Some(true) => Some(AlarmStatus::Armed),
            Some(false) => Some(AlarmStatus::Disarmed),
            None => None,
        })
    }
}

/// Wire payload of a device trigger report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceTriggerPayload {
    pub sensor_id: Option<String>,
    pub sensor_name: Option<String>,
    pub triggered: Option<bool>,
    pub event_type: Option<String>,
    pub tamper_triggered: Option<bool>,
    pub tamper_state: Option<i16>,
    pub message: Option<String>,
    pub timestamp: Option<serde_json::Value>,
}

/// A trigger report after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceTrigger {
    Sensor {
        sensor_id: String,
        sensor_name: Option<String>,
        triggered: bool,
    },
    Tamper {
        active: bool,
        state: i16,
    },
}

impl DeviceTriggerPayload {
    /// Classifies the report as a sensor or tamper trigger.
    pub fn classify(&self) -> Result<DeviceTrigger, AlarmError> {
        match self.event_type.as_deref() {
            Some("tamper_activated") => {
                return Ok(DeviceTrigger::Tamper {
                    active: true,
                    state: self.tamper_state.unwrap_or(1),
                })
            }
            Some("tamper_restored") => {
                return Ok(DeviceTrigger::Tamper {
                    active: false,
                    state: self.tamper_state.unwrap_or(0),
                })
            }
            _ => {}
        }

        if let Some(sensor_id) = self.sensor_id.as_deref().filter(|s| !s.is_empty()) {
            let triggered = self.triggered.ok_or_else(|| {
                AlarmError::Validation("triggered is required for sensor reports".to_string())
            })?;
            return Ok(DeviceTrigger::Sensor {
                sensor_id: sensor_id.to_string(),
                sensor_name: self.sensor_name.clone(),
                triggered,
            });
        }

        if let Some(active) = self.tamper_triggered {
            return Ok(DeviceTrigger::Tamper {
                active,
                state: self.tamper_state.unwrap_or(i16::from(active)),
            });
        }

        Err(AlarmError::Validation(
            "trigger report needs a sensor_id or a tamper event".to_string(),
        ))
    }
}

/// Raw sensor telemetry forwarded by the central unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorDataPayload {
    pub sensor_id: Option<String>,
    pub sensor_name: Option<String>,
    pub triggered: Option<bool>,
    pub rssi: Option<i32>,
    pub battery: Option<i32>,
    pub timestamp: Option<serde_json::Value>,
}

/// Every state change converges on one of these.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Operator {
        action: OperatorAction,
        actor: Actor,
        origin: Option<IpAddr>,
    },
    DeviceStatus {
        device: AuthenticatedDevice,
        report: DeviceStatusReport,
    },
    DeviceTrigger {
        device: AuthenticatedDevice,
        payload: DeviceTriggerPayload,
    },
    DeviceHeartbeat {
        device: AuthenticatedDevice,
        report: DeviceStatusReport,
    },
    SensorData {
        device: AuthenticatedDevice,
        payload: SensorDataPayload,
    },
}

impl BridgeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::Operator { .. } => "operator",
            BridgeEvent::DeviceStatus { .. } => "device_status",
            BridgeEvent::DeviceTrigger { .. } => "device_trigger",
            BridgeEvent::DeviceHeartbeat { .. } => "device_heartbeat",
            BridgeEvent::SensorData { .. } => "sensor_data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_claim() {
        assert_eq!(ActorRole::from_claim("admin"), ActorRole::Admin);
        assert_eq!(ActorRole::from_claim("ADMIN"), ActorRole::Admin);
        assert_eq!(ActorRole::from_claim("user"), ActorRole::Viewer);
        assert_eq!(ActorRole::from_claim("system"), ActorRole::Viewer);
        assert_eq!(ActorRole::from_claim("root"), ActorRole::Viewer);
    }

    #[test]
    fn test_reported_status_prefers_explicit_field() {
        let report = DeviceStatusReport {
            alarm_status: Some(AlarmStatus::Triggered),
            alarm_armed: Some(true),
            ..Default::default()
        };
        assert_eq!(report.reported_status(), Some(AlarmStatus::Triggered));

        let legacy = DeviceStatusReport {
            alarm_armed: Some(false),
            ..Default::default()
        };
        assert_eq!(legacy.reported_status(), Some(AlarmStatus::Disarmed));
        assert_eq!(DeviceStatusReport::default().reported_status(), None);
    }

    #[test]
    fn test_classify_sensor_trigger() {
        let payload = DeviceTriggerPayload {
            sensor_id: Some("sensor_sala_001".to_string()),
            triggered: Some(true),
            ..Default::default()
        };
        assert_eq!(
            payload.classify().unwrap(),
            DeviceTrigger::Sensor {
                sensor_id: "sensor_sala_001".to_string(),
                sensor_name: None,
                triggered: true,
            }
        );
    }

    #[test]
    fn test_classify_tamper_event_type() {
        let payload = DeviceTriggerPayload {
            event_type: Some("tamper_activated".to_string()),
            ..Default::default()
        };
        assert_eq!(
            payload.classify().unwrap(),
            DeviceTrigger::Tamper {
                active: true,
                state: 1
            }
        );
    }

    #[test]
    fn test_classify_rejects_empty_report() {
        assert!(matches!(
            DeviceTriggerPayload::default().classify(),
            Err(AlarmError::Validation(_))
        ));

        let missing_value = DeviceTriggerPayload {
            sensor_id: Some("s1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            missing_value.classify(),
            Err(AlarmError::Validation(_))
        ));
    }
}
