//! Sensor domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A monitored input registered with the alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub sensor_type: String,
    pub enabled: bool,
    pub triggered: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of recording a device report against a sensor.
#[derive(Debug, Clone)]
pub struct SensorTrigger {
    pub sensor: Sensor,
    /// The report repeated an activation already recorded inside the dedup
    /// window and left the row untouched.
    pub duplicate: bool,
}

impl Sensor {
    /// Applies a discrete trigger report at `at`.
    ///
    /// Returns `None` when an activation repeats one recorded less than
    /// `dedup_window` ago. The key is `last_triggered_at`, which only
    /// activations move. Restores always apply.
    pub fn with_report(
        &self,
        triggered: bool,
        at: DateTime<Utc>,
        dedup_window: chrono::Duration,
    ) -> Option<Sensor> {
        let repeated = triggered
            && self.triggered
            && self
                .last_triggered_at
                .is_some_and(|last| at - last < dedup_window);
        if repeated {
            return None;
        }

        let mut next = self.clone();
        next.triggered = triggered;
        if triggered {
            next.last_triggered_at = Some(at);
        }
        next.updated_at = at;
        Some(next)
    }

    /// Applies a raw telemetry reading. Leaves `last_triggered_at` alone so
    /// a discrete report of the same event is never mistaken for a repeat.
    pub fn with_telemetry(&self, triggered: bool, at: DateTime<Utc>) -> Sensor {
        let mut next = self.clone();
        next.triggered = triggered;
        next.updated_at = at;
        next
    }
}

/// Request payload for registering a sensor.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSensorRequest {
    #[validate(length(min = 1, max = 64, message = "Sensor id must be between 1 and 64 characters"))]
    #[validate(custom(function = "validate_sensor_id"))]
    pub id: String,

    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(length(max = 100, message = "Location must be at most 100 characters"))]
    pub location: Option<String>,

    #[validate(length(min = 1, max = 32, message = "Sensor type must be between 1 and 32 characters"))]
    #[serde(default = "default_sensor_type")]
    pub sensor_type: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Request payload for updating a sensor's descriptive fields.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateSensorRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 100, message = "Location must be at most 100 characters"))]
    pub location: Option<String>,

    #[validate(length(min = 1, max = 32, message = "Sensor type must be between 1 and 32 characters"))]
    pub sensor_type: Option<String>,
}

/// Body of the enable/disable endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

fn default_sensor_type() -> String {
    "motion".to_string()
}

fn default_enabled() -> bool {
    true
}

fn validate_sensor_id(id: &str) -> Result<(), validator::ValidationError> {
    if id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("invalid_sensor_id");
        err.message = Some("Sensor id may only contain letters, digits, '-' and '_'".into());
        Err(err)
    }
}
