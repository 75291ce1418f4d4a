//! Live push messages.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use super::alarm::HomeAlarm;
use super::history::HistoryEventType;
use super::schedule::Schedule;
use super::sensor::Sensor;

/// Interest group a live client can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushGroup {
    /// Aggregate status and discrete security events.
    Alarm,
    /// Sensor and schedule changes.
    Sensors,
    /// Raw central unit telemetry.
    Device,
}

impl PushGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushGroup::Alarm => "home_alarm",
            PushGroup::Sensors => "home_alarm:sensors",
            PushGroup::Device => "home_alarm:device",
        }
    }
}

impl fmt::Display for PushGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home_alarm" => Ok(PushGroup::Alarm),
            "home_alarm:sensors" => Ok(PushGroup::Sensors),
            "home_alarm:device" => Ok(PushGroup::Device),
            other => Err(format!("unknown push group: {}", other)),
        }
    }
}

/// Event delivered to live clients of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub group: PushGroup,
    pub event: &'static str,
    pub data: Value,
}

/// Frame written to the socket.
#[derive(Debug, Serialize)]
pub struct PushFrame<'a> {
    pub event: &'a str,
    pub data: &'a Value,
}

impl PushMessage {
    pub const STATUS: &'static str = "home_alarm:status";
    pub const EVENT: &'static str = "home_alarm:event";
    pub const SENSOR_UPDATED: &'static str = "home_alarm:sensor_updated";
    pub const TRIGGER: &'static str = "home_alarm:trigger";
    pub const SENSOR_DATA: &'static str = "home_alarm:sensor_data";
    pub const CENTRAL_STATUS: &'static str = "home_alarm:central_status";
    pub const HEARTBEAT: &'static str = "home_alarm:heartbeat";
    pub const SCHEDULE_CREATED: &'static str = "home_alarm:schedule_created";
    pub const SCHEDULE_UPDATED: &'static str = "home_alarm:schedule_updated";
    pub const SCHEDULE_DELETED: &'static str = "home_alarm:schedule_deleted";

    fn new(group: PushGroup, event: &'static str, data: Value) -> Self {
        Self { group, event, data }
    }

    pub fn status(alarm: &HomeAlarm) -> Self {
        Self::new(PushGroup::Alarm, Self::STATUS, json!(alarm))
    }

    pub fn security_event(
        event_type: HistoryEventType,
        message: &str,
        sensor_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            PushGroup::Alarm,
            Self::EVENT,
            json!({
                "type": event_type,
                "message": message,
                "sensor_id": sensor_id,
                "timestamp": at,
            }),
        )
    }

    pub fn sensor_updated(sensor: &Sensor) -> Self {
        Self::new(PushGroup::Sensors, Self::SENSOR_UPDATED, json!(sensor))
    }

    pub fn trigger(device_id: &str, payload: Value, at: DateTime<Utc>) -> Self {
        Self::new(
            PushGroup::Alarm,
            Self::TRIGGER,
            json!({ "device_id": device_id, "payload": payload, "received_at": at }),
        )
    }

    pub fn sensor_data(device_id: &str, payload: Value, at: DateTime<Utc>) -> Self {
        Self::new(
            PushGroup::Sensors,
            Self::SENSOR_DATA,
            json!({ "device_id": device_id, "payload": payload, "received_at": at }),
        )
    }

    pub fn central_status(device_id: &str, payload: Value, at: DateTime<Utc>) -> Self {
        Self::new(
            PushGroup::Device,
            Self::CENTRAL_STATUS,
            json!({ "device_id": device_id, "payload": payload, "received_at": at }),
        )
    }

    pub fn heartbeat(device_id: &str, payload: Value, at: DateTime<Utc>) -> Self {
        Self::new(
            PushGroup::Device,
            Self::HEARTBEAT,
            json!({ "device_id": device_id, "payload": payload, "received_at": at }),
        )
    }

    pub fn schedule_created(schedule: &Schedule) -> Self {
        Self::new(PushGroup::Sensors, Self::SCHEDULE_CREATED, json!(schedule))
    }

    pub fn schedule_updated(schedule: &Schedule) -> Self {
        Self::new(PushGroup::Sensors, Self::SCHEDULE_UPDATED, json!(schedule))
    }

    pub fn schedule_deleted(id: i64) -> Self {
        Self::new(PushGroup::Sensors, Self::SCHEDULE_DELETED, json!({ "id": id }))
    }

    pub fn frame(&self) -> PushFrame<'_> {
        PushFrame {
            event: self.event,
            data: &self.data,
        }
    }
}
