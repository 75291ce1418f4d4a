//! Alarm history and security log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of alarm history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    Armed,
    Disarmed,
    Triggered,
    SensorTriggered,
    SensorRestored,
    SensorEnabled,
    SensorDisabled,
    TamperActivated,
    TamperRestored,
    TamperReset,
    SirenOn,
    SirenOff,
    AutoArmEnabled,
    AutoArmDisabled,
    StateDrift,
}

impl HistoryEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryEventType::Armed => "armed",
            HistoryEventType::Disarmed => "disarmed",
            HistoryEventType::Triggered => "triggered",
            HistoryEventType::SensorTriggered => "sensor_triggered",
            HistoryEventType::SensorRestored => "sensor_restored",
            HistoryEventType::SensorEnabled => "sensor_enabled",
            HistoryEventType::SensorDisabled => "sensor_disabled",
            HistoryEventType::TamperActivated => "tamper_activated",
            HistoryEventType::TamperRestored => "tamper_restored",
            HistoryEventType::TamperReset => "tamper_reset",
            HistoryEventType::SirenOn => "siren_on",
            HistoryEventType::SirenOff => "siren_off",
            HistoryEventType::AutoArmEnabled => "auto_arm_enabled",
            HistoryEventType::AutoArmDisabled => "auto_arm_disabled",
            HistoryEventType::StateDrift => "state_drift",
        }
    }
}

impl fmt::Display for HistoryEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s {
            "armed" => HistoryEventType::Armed,
            "disarmed" => HistoryEventType::Disarmed,
            "triggered" => HistoryEventType::Triggered,
            "sensor_triggered" => HistoryEventType::SensorTriggered,
            "sensor_restored" => HistoryEventType::SensorRestored,
            "sensor_enabled" => HistoryEventType::SensorEnabled,
            "sensor_disabled" => HistoryEventType::SensorDisabled,
            "tamper_activated" => HistoryEventType::TamperActivated,
            "tamper_restored" => HistoryEventType::TamperRestored,
            "tamper_reset" => HistoryEventType::TamperReset,
            "siren_on" => HistoryEventType::SirenOn,
            "siren_off" => HistoryEventType::SirenOff,
            "auto_arm_enabled" => HistoryEventType::AutoArmEnabled,
            "auto_arm_disabled" => HistoryEventType::AutoArmDisabled,
            "state_drift" => HistoryEventType::StateDrift,
            other => return Err(format!("unknown history event type: {}", other)),
        };
        Ok(parsed)
    }
}

/// A persisted history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub event_type: HistoryEventType,
    pub sensor_id: Option<String>,
    pub user_id: Option<i64>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for a history entry.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub event_type: HistoryEventType,
    pub sensor_id: Option<String>,
    pub user_id: Option<i64>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewHistoryEntry {
    pub fn new(event_type: HistoryEventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            sensor_id: None,
            user_id: None,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn sensor(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    pub fn user(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Severity of a security log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Info,
    Warning,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Info => "info",
            SecurityLevel::Warning => "warning",
        }
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(SecurityLevel::Info),
            "warning" => Ok(SecurityLevel::Warning),
            other => Err(format!("unknown security level: {}", other)),
        }
    }
}

/// A security-tagged audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: i64,
    pub level: SecurityLevel,
    pub code: String,
    pub message: String,
    pub actor_id: Option<i64>,
    pub actor_role: Option<String>,
    pub origin: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for a security log record.
#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub level: SecurityLevel,
    pub code: String,
    pub message: String,
    pub actor_id: Option<i64>,
    pub actor_role: Option<String>,
    pub origin: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
