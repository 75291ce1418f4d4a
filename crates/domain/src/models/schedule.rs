//! Auto-arm schedule domain model.

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// What a schedule does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleAction {
    Arm,
    Disarm,
}

impl ScheduleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleAction::Arm => "arm",
            ScheduleAction::Disarm => "disarm",
        }
    }
}

impl fmt::Display for ScheduleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arm" => Ok(ScheduleAction::Arm),
            "disarm" => Ok(ScheduleAction::Disarm),
            other => Err(format!("unknown schedule action: {}", other)),
        }
    }
}

/// A recurring arm/disarm rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub name: String,
    pub action: ScheduleAction,
    /// ISO weekdays, 1 = Monday through 7 = Sunday.
    pub days_of_week: Vec<i16>,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Whether an occurrence falls in `(after, until]`, in UTC.
    pub fn fires_between(&self, after: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        if !self.enabled || until <= after {
            return false;
        }

        let mut day = after.date_naive();
        while day <= until.date_naive() {
            let weekday = day.weekday().number_from_monday() as i16;
            let at = day.and_time(self.time).and_utc();
            if at > after && at <= until && self.days_of_week.contains(&weekday) {
                return true;
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        false
    }
}

/// Request payload for creating or replacing a schedule.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    pub action: ScheduleAction,

    #[validate(custom(function = "validate_days_of_week"))]
    pub days_of_week: Vec<i16>,

    #[serde(with = "hhmm")]
    pub time: NaiveTime,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ScheduleRequest {
    /// Sorted, de-duplicated weekday list.
    pub fn normalized_days(&self) -> Vec<i16> {
        let mut days = self.days_of_week.clone();
        days.sort_unstable();
        days.dedup();
        days
    }
}

fn default_enabled() -> bool {
    true
}

fn validate_days_of_week(days: &[i16]) -> Result<(), validator::ValidationError> {
    if days.is_empty() {
        let mut err = validator::ValidationError::new("days_of_week_empty");
        err.message = Some("At least one day of week is required".into());
        return Err(err);
    }
    if days.iter().any(|d| !(1..=7).contains(d)) {
        let mut err = validator::ValidationError::new("days_of_week_range");
        err.message = Some("Days of week must be between 1 (Monday) and 7 (Sunday)".into());
        return Err(err);
    }
    Ok(())
}

/// Serializes a time of day as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        // Accept HH:MM:SS from older clients, drop the seconds.
        NaiveTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|_| serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(days: Vec<i16>) -> ScheduleRequest {
        ScheduleRequest {
            name: "Weeknights".to_string(),
            action: ScheduleAction::Arm,
            days_of_week: days,
            time: NaiveTime::from_hms_opt(22, 30, 0).unwrap(),
            enabled: true,
        }
    }

    #[test]
    fn test_days_validation() {
        assert!(request(vec![1, 2, 3, 4, 5]).validate().is_ok());
        assert!(request(vec![]).validate().is_err());
        assert!(request(vec![0, 1]).validate().is_err());
        assert!(request(vec![8]).validate().is_err());
    }

    fn schedule(days: Vec<i16>, time: &str) -> Schedule {
        Schedule {
            id: 1,
            name: "Night".to_string(),
            action: ScheduleAction::Arm,
            days_of_week: days,
            time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_fires_between_matches_weekday_and_time() {
        // 2026-10-12 is a Monday.
        let s = schedule(vec![1], "22:30");
        assert!(s.fires_between(at("2026-10-12T22:29:00Z"), at("2026-10-12T22:30:00Z")));
        assert!(!s.fires_between(at("2026-10-12T22:30:00Z"), at("2026-10-12T22:31:00Z")));
        assert!(!s.fires_between(at("2026-10-13T22:29:00Z"), at("2026-10-13T22:30:00Z")));
    }

    #[test]
    fn test_fires_between_across_midnight() {
        // Sunday 23:59 to Monday 00:01 catches a Monday 00:00 rule.
        let s = schedule(vec![1], "00:00");
        assert!(s.fires_between(at("2026-10-11T23:59:00Z"), at("2026-10-12T00:01:00Z")));
    }

    #[test]
    fn test_disabled_schedule_never_fires() {
        let mut s = schedule(vec![1, 2, 3, 4, 5, 6, 7], "12:00");
        s.enabled = false;
        assert!(!s.fires_between(at("2026-10-12T11:00:00Z"), at("2026-10-12T13:00:00Z")));
    }

    #[test]
    fn test_normalized_days() {
        assert_eq!(request(vec![5, 1, 5, 3]).normalized_days(), vec![1, 3, 5]);
    }

    #[test]
    fn test_time_parsing() {
        let req: ScheduleRequest = serde_json::from_str(
            r#"{"name":"Night","action":"arm","days_of_week":[1,2],"time":"23:15"}"#,
        )
        .unwrap();
        assert_eq!(req.time, NaiveTime::from_hms_opt(23, 15, 0).unwrap());
        assert!(req.enabled);

        let with_seconds: ScheduleRequest = serde_json::from_str(
            r#"{"name":"Morning","action":"disarm","days_of_week":[6],"time":"07:00:00"}"#,
        )
        .unwrap();
        assert_eq!(with_seconds.action, ScheduleAction::Disarm);

        let bad = serde_json::from_str::<ScheduleRequest>(
            r#"{"name":"Bad","action":"arm","days_of_week":[1],"time":"25:99"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_schedule_serializes_time_as_hhmm() {
        let now = Utc::now();
        let schedule = Schedule {
            id: 1,
            name: "Night".to_string(),
            action: ScheduleAction::Arm,
            days_of_week: vec![1, 2, 3],
            time: NaiveTime::from_hms_opt(6, 5, 0).unwrap(),
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&schedule).unwrap();
        assert_eq!(json["time"], "06:05");
        assert_eq!(json["action"], "arm");
    }
}
