//! Home alarm aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Arming status of the alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    Disarmed,
    Arming,
    Armed,
    Disarming,
    Triggered,
}

impl AlarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmStatus::Disarmed => "disarmed",
            AlarmStatus::Arming => "arming",
            AlarmStatus::Armed => "armed",
            AlarmStatus::Disarming => "disarming",
            AlarmStatus::Triggered => "triggered",
        }
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disarmed" => Ok(AlarmStatus::Disarmed),
            "arming" => Ok(AlarmStatus::Arming),
            "armed" => Ok(AlarmStatus::Armed),
            "disarming" => Ok(AlarmStatus::Disarming),
            "triggered" => Ok(AlarmStatus::Triggered),
            other => Err(format!("unknown alarm status: {}", other)),
        }
    }
}

/// Siren state. `Manual` means an operator turned it on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SirenStatus {
    Off,
    On,
    Manual,
}

impl SirenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SirenStatus::Off => "off",
            SirenStatus::On => "on",
            SirenStatus::Manual => "manual",
        }
    }

    pub fn is_sounding(&self) -> bool {
        !matches!(self, SirenStatus::Off)
    }
}

impl fmt::Display for SirenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SirenStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(SirenStatus::Off),
            "on" => Ok(SirenStatus::On),
            "manual" => Ok(SirenStatus::Manual),
            other => Err(format!("unknown siren status: {}", other)),
        }
    }
}

/// The single authoritative alarm record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeAlarm {
    pub status: AlarmStatus,
    pub siren_status: SirenStatus,
    /// Raw siren code last reported by the central unit.
    pub siren_state: i16,
    pub tamper_triggered: bool,
    /// Raw tamper code last reported by the central unit.
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

impl HomeAlarm {
    /// The record as it exists right after installation.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            status: AlarmStatus::Disarmed,
            siren_status: SirenStatus::Off,
            siren_state: 0,
            tamper_triggered: false,
            tamper_state: 0,
            auto_arm_enabled: false,
            last_armed_by: None,
            last_armed_at: None,
            last_disarmed_by: None,
            last_disarmed_at: None,
            triggered_at: None,
            last_device_contact_at: None,
            updated_at: now,
        }
    }

    /// `triggered_at` is set exactly when the alarm is triggered, and a
    /// disarmed alarm never has it.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            AlarmStatus::Triggered => self.triggered_at.is_some(),
            AlarmStatus::Disarmed => self.triggered_at.is_none(),
            _ => true,
        }
    }
}
