//! Alarm state machine.
//!
//! Every aggregate mutation is expressed as an [`AlarmMutation`] and applied
//! by [`AlarmMutation::apply`]. Stores run `apply` inside their atomic
//! read-modify-write so the rules live in one place.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{AlarmStatus, DeviceStatusReport, HomeAlarm, SirenStatus};

/// A change to the alarm aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmMutation {
    Arm { actor_id: Option<i64> },
    Disarm { actor_id: Option<i64> },
    SirenManual,
    SirenOff,
    ResetTamper,
    SetAutoArm(bool),
    /// The central unit reported its observed state.
    DeviceReport(DeviceObservation),
    /// An enabled or disabled sensor changed state.
    SensorTrip { triggered: bool, sensor_enabled: bool },
    Tamper { active: bool, state: i16 },
    /// Raw code refresh. Never touches `status`.
    Heartbeat {
        siren_state: Option<i16>,
        tamper_state: Option<i16>,
    },
}

/// Fields the central unit is authoritative for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceObservation {
    pub status: Option<AlarmStatus>,
    pub siren_active: Option<bool>,
    pub siren_state: Option<i16>,
    pub tamper_triggered: Option<bool>,
    pub tamper_state: Option<i16>,
}

impl From<&DeviceStatusReport> for DeviceObservation {
    fn from(report: &DeviceStatusReport) -> Self {
        Self {
            status: report.reported_status(),
            siren_active: report.siren_active,
            siren_state: report.siren_state,
            tamper_triggered: report.tamper_triggered,
            tamper_state: report.tamper_state,
        }
    }
}

/// Aggregate before and after one committed mutation.
#[derive(Debug, Clone)]
pub struct AlarmTransition {
    pub before: HomeAlarm,
    pub after: HomeAlarm,
}

impl AlarmTransition {
    pub fn status_changed(&self) -> bool {
        self.before.status != self.after.status
    }

    pub fn entered_triggered(&self) -> bool {
        self.before.status != AlarmStatus::Triggered && self.after.status == AlarmStatus::Triggered
    }
}

impl AlarmMutation {
    pub fn name(&self) -> &'static str {
        match self {
            AlarmMutation::Arm { .. } => "arm",
            AlarmMutation::Disarm { .. } => "disarm",
            AlarmMutation::SirenManual => "siren_manual",
            AlarmMutation::SirenOff => "siren_off",
            AlarmMutation::ResetTamper => "reset_tamper",
            AlarmMutation::SetAutoArm(_) => "set_auto_arm",
            AlarmMutation::DeviceReport(_) => "device_report",
            AlarmMutation::SensorTrip { .. } => "sensor_trip",
            AlarmMutation::Tamper { .. } => "tamper",
            AlarmMutation::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Computes the next aggregate. Pure; never touches a store.
    pub fn apply(&self, current: &HomeAlarm, now: DateTime<Utc>) -> Result<HomeAlarm, StoreError> {
        let mut next = current.clone();

        match self {
            AlarmMutation::Arm { actor_id } => {
                if current.status == AlarmStatus::Triggered {
                    return Err(StoreError::Rejected(
                        "alarm is triggered, disarm it before arming again".to_string(),
                    ));
                }
                next.status = AlarmStatus::Armed;
                next.last_armed_by = *actor_id;
                next.last_armed_at = Some(now);
                next.triggered_at = None;
            }
            AlarmMutation::Disarm { actor_id } => {
                next.status = AlarmStatus::Disarmed;
                next.last_disarmed_by = *actor_id;
                next.last_disarmed_at = Some(now);
                next.triggered_at = None;
                next.siren_status = SirenStatus::Off;
            }
            AlarmMutation::SirenManual => {
                next.siren_status = SirenStatus::Manual;
            }
            AlarmMutation::SirenOff => {
                next.siren_status = SirenStatus::Off;
            }
            AlarmMutation::ResetTamper => {
                next.tamper_triggered = false;
                next.tamper_state = 0;
            }
            AlarmMutation::SetAutoArm(enabled) => {
                next.auto_arm_enabled = *enabled;
            }
            AlarmMutation::DeviceReport(observed) => {
                apply_observation(&mut next, observed, now);
                next.last_device_contact_at = Some(now);
            }
            AlarmMutation::SensorTrip {
                triggered,
                sensor_enabled,
            } => {
                if *triggered && *sensor_enabled && current.status == AlarmStatus::Armed {
                    next.status = AlarmStatus::Triggered;
                    next.triggered_at = Some(now);
                    next.siren_status = SirenStatus::On;
                }
            }
            AlarmMutation::Tamper { active, state } => {
                next.tamper_triggered = *active;
                next.tamper_state = *state;
                if *active && next.siren_status == SirenStatus::Off {
                    next.siren_status = SirenStatus::On;
                }
                next.last_device_contact_at = Some(now);
            }
            AlarmMutation::Heartbeat {
                siren_state,
                tamper_state,
            } => {
                if let Some(code) = siren_state {
                    next.siren_state = *code;
                }
                if let Some(code) = tamper_state {
                    next.tamper_state = *code;
                }
                next.last_device_contact_at = Some(now);
            }
        }

        next.updated_at = now;
        Ok(next)
    }
}

fn apply_observation(next: &mut HomeAlarm, observed: &DeviceObservation, now: DateTime<Utc>) {
    match observed.status {
        // A central unit that still reports "armed" has not seen the trip yet.
        Some(AlarmStatus::Armed) if next.status == AlarmStatus::Triggered => {}
        Some(AlarmStatus::Triggered) => {
            next.status = AlarmStatus::Triggered;
            next.triggered_at = next.triggered_at.or(Some(now));
        }
        Some(status) => {
            next.status = status;
            next.triggered_at = None;
        }
        None => {}
    }

    match observed.siren_active {
        Some(false) => next.siren_status = SirenStatus::Off,
        Some(true) if next.siren_status == SirenStatus::Off => next.siren_status = SirenStatus::On,
        _ => {}
    }

    if let Some(code) = observed.siren_state {
        next.siren_state = code;
    }
    if let Some(flag) = observed.tamper_triggered {
        next.tamper_triggered = flag;
    }
    if let Some(code) = observed.tamper_state {
        next.tamper_state = code;
    }
}

/// Fields where a device report disagrees with what was stored before it.
pub fn detect_drift(before: &HomeAlarm, observed: &DeviceObservation) -> Vec<&'static str> {
    let mut drift = Vec::new();
    if let Some(flag) = observed.tamper_triggered {
        if flag != before.tamper_triggered {
            drift.push("tamper_triggered");
        }
    }
    if let Some(active) = observed.siren_active {
        if active != before.siren_status.is_sounding() {
            drift.push("siren");
        }
    }
    drift
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alarm(status: AlarmStatus) -> HomeAlarm {
        let now = Utc::now();
        let mut a = HomeAlarm::initial(now);
        a.status = status;
        if status == AlarmStatus::Triggered {
            a.triggered_at = Some(now);
            a.siren_status = SirenStatus::On;
        }
        a
    }

    #[test]
    fn test_arm_records_actor() {
        let now = Utc::now();
        let next = AlarmMutation::Arm { actor_id: Some(42) }
            .apply(&alarm(AlarmStatus::Disarmed), now)
            .unwrap();
        assert_eq!(next.status, AlarmStatus::Armed);
        assert_eq!(next.last_armed_by, Some(42));
        assert_eq!(next.last_armed_at, Some(now));
        assert!(next.is_consistent());
    }

    #[test]
    fn test_arm_while_triggered_is_rejected() {
        let result = AlarmMutation::Arm { actor_id: Some(1) }
            .apply(&alarm(AlarmStatus::Triggered), Utc::now());
        assert!(matches!(result, Err(StoreError::Rejected(_))));
    }

    #[test]
    fn test_disarm_clears_trigger_and_siren() {
        let mut current = alarm(AlarmStatus::Triggered);
        current.siren_status = SirenStatus::Manual;
        let next = AlarmMutation::Disarm { actor_id: Some(7) }
            .apply(&current, Utc::now())
            .unwrap();
        assert_eq!(next.status, AlarmStatus::Disarmed);
        assert_eq!(next.siren_status, SirenStatus::Off);
        assert!(next.triggered_at.is_none());
        assert_eq!(next.last_disarmed_by, Some(7));
        assert!(next.is_consistent());
    }

    #[test]
    fn test_sensor_trip_only_fires_when_armed() {
        let now = Utc::now();
        let trip = AlarmMutation::SensorTrip {
            triggered: true,
            sensor_enabled: true,
        };

        for status in [
            AlarmStatus::Disarmed,
            AlarmStatus::Arming,
            AlarmStatus::Disarming,
        ] {
            let next = trip.apply(&alarm(status), now).unwrap();
            assert_eq!(next.status, status);
            assert_eq!(next.siren_status, SirenStatus::Off);
        }

        let next = trip.apply(&alarm(AlarmStatus::Armed), now).unwrap();
        assert_eq!(next.status, AlarmStatus::Triggered);
        assert_eq!(next.siren_status, SirenStatus::On);
        assert!(next.triggered_at.unwrap() <= now);
    }

    #[test]
    fn test_disabled_sensor_does_not_trip() {
        let next = AlarmMutation::SensorTrip {
            triggered: true,
            sensor_enabled: false,
        }
        .apply(&alarm(AlarmStatus::Armed), Utc::now())
        .unwrap();
        assert_eq!(next.status, AlarmStatus::Armed);
    }

    #[test]
    fn test_second_trip_keeps_first_timestamp() {
        let current = alarm(AlarmStatus::Triggered);
        let first = current.triggered_at;
        let next = AlarmMutation::SensorTrip {
            triggered: true,
            sensor_enabled: true,
        }
        .apply(&current, Utc::now() + Duration::seconds(10))
        .unwrap();
        assert_eq!(next.triggered_at, first);
    }

    #[test]
    fn test_tamper_is_honored_when_disarmed() {
        let next = AlarmMutation::Tamper {
            active: true,
            state: 3,
        }
        .apply(&alarm(AlarmStatus::Disarmed), Utc::now())
        .unwrap();
        assert!(next.tamper_triggered);
        assert_eq!(next.tamper_state, 3);
        assert_eq!(next.siren_status, SirenStatus::On);
        assert_eq!(next.status, AlarmStatus::Disarmed);
    }

    #[test]
    fn test_tamper_keeps_manual_siren() {
        let mut current = alarm(AlarmStatus::Armed);
        current.siren_status = SirenStatus::Manual;
        let next = AlarmMutation::Tamper {
            active: true,
            state: 1,
        }
        .apply(&current, Utc::now())
        .unwrap();
        assert_eq!(next.siren_status, SirenStatus::Manual);
    }

    #[test]
    fn test_device_report_armed_keeps_triggered() {
        let current = alarm(AlarmStatus::Triggered);
        let next = AlarmMutation::DeviceReport(DeviceObservation {
            status: Some(AlarmStatus::Armed),
            ..Default::default()
        })
        .apply(&current, Utc::now())
        .unwrap();
        assert_eq!(next.status, AlarmStatus::Triggered);
        assert!(next.is_consistent());
    }

    #[test]
    fn test_device_report_overwrites_observed_fields() {
        let now = Utc::now();
        let next = AlarmMutation::DeviceReport(DeviceObservation {
            status: Some(AlarmStatus::Disarmed),
            siren_active: Some(false),
            siren_state: Some(0),
            tamper_triggered: Some(true),
            tamper_state: Some(2),
        })
        .apply(&alarm(AlarmStatus::Triggered), now)
        .unwrap();
        assert_eq!(next.status, AlarmStatus::Disarmed);
        assert!(next.triggered_at.is_none());
        assert_eq!(next.siren_status, SirenStatus::Off);
        assert!(next.tamper_triggered);
        assert_eq!(next.tamper_state, 2);
        assert_eq!(next.last_device_contact_at, Some(now));
    }

    #[test]
    fn test_device_report_accepts_transient_states() {
        let next = AlarmMutation::DeviceReport(DeviceObservation {
            status: Some(AlarmStatus::Arming),
            ..Default::default()
        })
        .apply(&alarm(AlarmStatus::Disarmed), Utc::now())
        .unwrap();
        assert_eq!(next.status, AlarmStatus::Arming);
    }

    #[test]
    fn test_heartbeat_never_changes_status() {
        let current = alarm(AlarmStatus::Armed);
        let next = AlarmMutation::Heartbeat {
            siren_state: Some(1),
            tamper_state: Some(4),
        }
        .apply(&current, Utc::now())
        .unwrap();
        assert_eq!(next.status, AlarmStatus::Armed);
        assert_eq!(next.siren_status, current.siren_status);
        assert_eq!(next.siren_state, 1);
        assert_eq!(next.tamper_state, 4);
    }

    #[test]
    fn test_detect_drift() {
        let before = alarm(AlarmStatus::Armed);
        let observed = DeviceObservation {
            tamper_triggered: Some(true),
            siren_active: Some(false),
            ..Default::default()
        };
        assert_eq!(detect_drift(&before, &observed), vec!["tamper_triggered"]);

        let agreeing = DeviceObservation {
            tamper_triggered: Some(false),
            siren_active: Some(false),
            ..Default::default()
        };
        assert!(detect_drift(&before, &agreeing).is_empty());
    }
}
