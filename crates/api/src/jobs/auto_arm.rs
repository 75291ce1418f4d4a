//! Runs arm/disarm schedules against the alarm.
//!
//! Schedules are evaluated in UTC once a minute and only while auto-arm is
//! enabled on the aggregate. Commands go through the bridge as the scheduler
//! actor, so they get the same history, push and outbox handling as operator
//! commands.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use domain::models::{Actor, AlarmStatus, OperatorAction, Schedule, ScheduleAction};
use domain::services::{ConfigurationService, TransportBridge};
use domain::AlarmError;
use tracing::{info, warn};

use super::scheduler::Job;

pub struct AutoArmJob {
    bridge: Arc<TransportBridge>,
    configuration: Arc<ConfigurationService>,
    last_check: Mutex<DateTime<Utc>>,
}

impl AutoArmJob {
    pub fn new(bridge: Arc<TransportBridge>, configuration: Arc<ConfigurationService>) -> Self {
        Self::starting_at(bridge, configuration, Utc::now())
    }

    fn starting_at(
        bridge: Arc<TransportBridge>,
        configuration: Arc<ConfigurationService>,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            bridge,
            configuration,
            last_check: Mutex::new(start),
        }
    }

    fn window_start(&self) -> Result<DateTime<Utc>, String> {
        self.last_check
            .lock()
            .map(|last| *last)
            .map_err(|_| "auto-arm window lock poisoned".to_string())
    }

    fn close_window(&self, now: DateTime<Utc>) -> Result<(), String> {
        let mut last = self
            .last_check
            .lock()
            .map_err(|_| "auto-arm window lock poisoned".to_string())?;
        *last = now;
        Ok(())
    }

    /// Fires every schedule due in `(previous check, now]`.
    ///
    /// The window only moves forward after a complete evaluation, so a
    /// store failure retries the same schedules on the next run.
    async fn run_until(&self, now: DateTime<Utc>) -> Result<usize, String> {
        let after = self.window_start()?;
        let fired = self.evaluate(after, now).await?;
        self.close_window(now)?;
        Ok(fired)
    }

    async fn evaluate(&self, after: DateTime<Utc>, now: DateTime<Utc>) -> Result<usize, String> {
        let alarm = self
            .bridge
            .current_state()
            .await
            .map_err(|e| format!("Failed to load alarm state: {}", e))?;
        if !alarm.auto_arm_enabled {
            return Ok(0);
        }

        let schedules = self
            .configuration
            .list_schedules()
            .await
            .map_err(|e| format!("Failed to list schedules: {}", e))?;

        let mut due: Vec<&Schedule> = schedules
            .iter()
            .filter(|s| s.fires_between(after, now))
            .collect();
        // Latest time wins when several rules fall in one window.
        due.sort_by_key(|s| s.time);
        let Some(schedule) = due.last() else {
            return Ok(0);
        };

        let action = match schedule.action {
            ScheduleAction::Arm if alarm.status == AlarmStatus::Disarmed => OperatorAction::Arm,
            ScheduleAction::Disarm if alarm.status != AlarmStatus::Disarmed => {
                OperatorAction::Disarm
            }
            _ => return Ok(0),
        };

        match self
            .bridge
            .on_operator_command(action, Actor::scheduler(), None)
            .await
        {
            Ok(_) => {
                info!(schedule_id = schedule.id, action = %schedule.action, "Schedule executed");
                Ok(1)
            }
            Err(AlarmError::Internal(e)) => {
                Err(format!("Schedule {} failed: {}", schedule.id, e))
            }
            Err(e) => {
                warn!(schedule_id = schedule.id, error = %e, "Schedule rejected");
                Ok(0)
            }
        }
    }
}

#[async_trait::async_trait]
impl Job for AutoArmJob {
    fn name(&self) -> &'static str {
        "auto_arm"
    }

    fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(60)
    }

    async fn execute(&self) -> Result<(), String> {
        self.run_until(Utc::now()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime, Timelike};
    use domain::models::{ActorRole, ScheduleRequest};
    use domain::services::memory::{
        InMemoryAlarmStore, InMemoryAuditStore, InMemoryCommandStore, InMemoryScheduleStore,
        InMemorySensorStore,
    };
    use domain::services::{BridgeSettings, CommandOutbox, PushHub, ScheduleStore};
    use domain::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        bridge: Arc<TransportBridge>,
        configuration: Arc<ConfigurationService>,
    }

    fn harness() -> Harness {
        let audit = Arc::new(InMemoryAuditStore::new());
        let sensors = Arc::new(InMemorySensorStore::new());
        let push = Arc::new(PushHub::new(16));
        let outbox = CommandOutbox::new(Arc::new(InMemoryCommandStore::new()), Duration::minutes(5));
        let bridge = TransportBridge::new(
            Arc::new(InMemoryAlarmStore::new()),
            sensors.clone(),
            audit.clone(),
            outbox,
            push.clone(),
            BridgeSettings::default(),
        );
        let configuration = ConfigurationService::new(
            sensors,
            Arc::new(InMemoryScheduleStore::new()),
            audit,
            push,
        );
        Harness {
            bridge: Arc::new(bridge),
            configuration: Arc::new(configuration),
        }
    }

    fn admin() -> Actor {
        Actor::user(1, ActorRole::Admin)
    }

    async fn add_schedule(h: &Harness, action: ScheduleAction, now: DateTime<Utc>) {
        let time = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap();
        h.configuration
            .create_schedule(
                &admin(),
                None,
                ScheduleRequest {
                    name: "Every day".to_string(),
                    action,
                    days_of_week: vec![1, 2, 3, 4, 5, 6, 7],
                    time,
                    enabled: true,
                },
            )
            .await
            .unwrap();
    }

    fn minute_start(now: DateTime<Utc>) -> DateTime<Utc> {
        now.with_second(0).unwrap().with_nanosecond(0).unwrap()
    }

    #[tokio::test]
    async fn test_due_schedule_arms_when_auto_arm_enabled() {
        let h = harness();
        let now = minute_start(Utc::now());
        add_schedule(&h, ScheduleAction::Arm, now).await;
        h.bridge
            .on_operator_command(OperatorAction::SetAutoArm(true), admin(), None)
            .await
            .unwrap();

        let job = AutoArmJob::starting_at(
            h.bridge.clone(),
            h.configuration.clone(),
            now - Duration::minutes(1),
        );
        assert_eq!(job.run_until(now).await.unwrap(), 1);

        let alarm = h.bridge.current_state().await.unwrap();
        assert_eq!(alarm.status, AlarmStatus::Armed);
        assert_eq!(alarm.last_armed_by, None);

        // The same window never fires twice.
        assert_eq!(job.run_until(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_auto_arm_disabled_skips_schedules() {
        let h = harness();
        let now = minute_start(Utc::now());
        add_schedule(&h, ScheduleAction::Arm, now).await;

        let job = AutoArmJob::starting_at(
            h.bridge.clone(),
            h.configuration.clone(),
            now - Duration::minutes(1),
        );
        assert_eq!(job.run_until(now).await.unwrap(), 0);
        assert_eq!(
            h.bridge.current_state().await.unwrap().status,
            AlarmStatus::Disarmed
        );
    }

    /// Schedule store whose first `failures` listings fail.
    struct FlakyScheduleStore {
        inner: InMemoryScheduleStore,
        failures: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ScheduleStore for FlakyScheduleStore {
        async fn list(&self) -> Result<Vec<Schedule>, StoreError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.list().await
        }

        async fn get(&self, id: i64) -> Result<Option<Schedule>, StoreError> {
            self.inner.get(id).await
        }

        async fn create(
            &self,
            request: &ScheduleRequest,
            now: DateTime<Utc>,
        ) -> Result<Schedule, StoreError> {
            self.inner.create(request, now).await
        }

        async fn update(
            &self,
            id: i64,
            request: &ScheduleRequest,
            now: DateTime<Utc>,
        ) -> Result<Option<Schedule>, StoreError> {
            self.inner.update(id, request, now).await
        }

        async fn set_enabled(
            &self,
            id: i64,
            enabled: bool,
            now: DateTime<Utc>,
        ) -> Result<Option<Schedule>, StoreError> {
            self.inner.set_enabled(id, enabled, now).await
        }

        async fn delete(&self, id: i64) -> Result<bool, StoreError> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_store_failure_retries_same_window() {
        let h = harness();
        let schedules = Arc::new(FlakyScheduleStore {
            inner: InMemoryScheduleStore::new(),
            failures: AtomicUsize::new(0),
        });
        let configuration = Arc::new(ConfigurationService::new(
            Arc::new(InMemorySensorStore::new()),
            schedules.clone(),
            Arc::new(InMemoryAuditStore::new()),
            Arc::new(PushHub::new(4)),
        ));
        let now = minute_start(Utc::now());
        let time = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap();
        configuration
            .create_schedule(
                &admin(),
                None,
                ScheduleRequest {
                    name: "Nightly".to_string(),
                    action: ScheduleAction::Arm,
                    days_of_week: vec![1, 2, 3, 4, 5, 6, 7],
                    time,
                    enabled: true,
                },
            )
            .await
            .unwrap();
        h.bridge
            .on_operator_command(OperatorAction::SetAutoArm(true), admin(), None)
            .await
            .unwrap();

        let job = AutoArmJob::starting_at(h.bridge.clone(), configuration, now - Duration::minutes(1));
        schedules.failures.store(1, Ordering::SeqCst);
        assert!(job.run_until(now).await.is_err());
        assert_eq!(
            h.bridge.current_state().await.unwrap().status,
            AlarmStatus::Disarmed
        );

        // Next run covers the missed minute.
        assert_eq!(job.run_until(now + Duration::minutes(1)).await.unwrap(), 1);
        assert_eq!(
            h.bridge.current_state().await.unwrap().status,
            AlarmStatus::Armed
        );
    }

    #[tokio::test]
    async fn test_disarm_schedule_on_disarmed_alarm_is_noop() {
        let h = harness();
        let now = minute_start(Utc::now());
        add_schedule(&h, ScheduleAction::Disarm, now).await;
        h.bridge
            .on_operator_command(OperatorAction::SetAutoArm(true), admin(), None)
            .await
            .unwrap();

        let job = AutoArmJob::starting_at(
            h.bridge.clone(),
            h.configuration.clone(),
            now - Duration::minutes(1),
        );
        assert_eq!(job.run_until(now).await.unwrap(), 0);
    }
}
