//! Sensor and schedule management.
//!
//! Changes here are operator configuration, not alarm state, so they bypass
//! the transport bridge. They are admin-only and broadcast like bridge events.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use super::authorization::{authorize, GuardedAction};
use super::ports::{AuditStore, PushBroadcaster, ScheduleStore, SensorStore};
use crate::error::AlarmError;
use crate::models::{
    Actor, CreateSensorRequest, HistoryEventType, NewHistoryEntry, PushMessage, Schedule,
    ScheduleRequest, Sensor, UpdateSensorRequest,
};

#[derive(Clone)]
pub struct ConfigurationService {
    sensors: Arc<dyn SensorStore>,
    schedules: Arc<dyn ScheduleStore>,
    audit: Arc<dyn AuditStore>,
    push: Arc<dyn PushBroadcaster>,
}

impl ConfigurationService {
    pub fn new(
        sensors: Arc<dyn SensorStore>,
        schedules: Arc<dyn ScheduleStore>,
        audit: Arc<dyn AuditStore>,
        push: Arc<dyn PushBroadcaster>,
    ) -> Self {
        Self {
            sensors,
            schedules,
            audit,
            push,
        }
    }

    pub async fn list_sensors(&self) -> Result<Vec<Sensor>, AlarmError> {
        Ok(self.sensors.list().await?)
    }

    pub async fn create_sensor(
        &self,
        actor: &Actor,
        origin: Option<IpAddr>,
        request: CreateSensorRequest,
    ) -> Result<Sensor, AlarmError> {
        authorize(self.audit.as_ref(), actor, GuardedAction::ManageSensors, origin).await?;
        request.validate()?;

        let sensor = self.sensors.create(&request, Utc::now()).await?;
        tracing::info!(sensor_id = %sensor.id, actor_id = ?actor.id, "Sensor registered");
        self.push.broadcast(PushMessage::sensor_updated(&sensor));
        Ok(sensor)
    }

    pub async fn update_sensor(
        &self,
        actor: &Actor,
        origin: Option<IpAddr>,
        sensor_id: &str,
        request: UpdateSensorRequest,
    ) -> Result<Sensor, AlarmError> {
        authorize(self.audit.as_ref(), actor, GuardedAction::ManageSensors, origin).await?;
        request.validate()?;

        let sensor = self
            .sensors
            .update(sensor_id, &request, Utc::now())
            .await?
            .ok_or_else(|| sensor_not_found(sensor_id))?;
        self.push.broadcast(PushMessage::sensor_updated(&sensor));
        Ok(sensor)
    }

    pub async fn toggle_sensor(
        &self,
        actor: &Actor,
        origin: Option<IpAddr>,
        sensor_id: &str,
        enabled: bool,
    ) -> Result<Sensor, AlarmError> {
        authorize(self.audit.as_ref(), actor, GuardedAction::ManageSensors, origin).await?;

        let sensor = self
            .sensors
            .set_enabled(sensor_id, enabled, Utc::now())
            .await?
            .ok_or_else(|| sensor_not_found(sensor_id))?;

        let (event_type, verb) = if enabled {
            (HistoryEventType::SensorEnabled, "enabled")
        } else {
            (HistoryEventType::SensorDisabled, "disabled")
        };
        let entry = NewHistoryEntry::new(event_type, format!("Sensor {} {}", sensor.name, verb))
            .sensor(sensor.id.clone())
            .user(actor.id);
        if let Err(e) = self.audit.append(&entry, Utc::now()).await {
            tracing::error!(error = %e, sensor_id = %sensor.id, "Failed to append sensor toggle history");
        }

        self.push.broadcast(PushMessage::sensor_updated(&sensor));
        Ok(sensor)
    }

    pub async fn list_schedules(&self) -> Result<Vec<Schedule>, AlarmError> {
        Ok(self.schedules.list().await?)
    }

    pub async fn create_schedule(
        &self,
        actor: &Actor,
        origin: Option<IpAddr>,
        request: ScheduleRequest,
    ) -> Result<Schedule, AlarmError> {
        authorize(self.audit.as_ref(), actor, GuardedAction::ManageSchedules, origin).await?;
        request.validate()?;

        let schedule = self.schedules.create(&request, Utc::now()).await?;
        tracing::info!(schedule_id = schedule.id, action = %schedule.action, "Schedule created");
        self.push.broadcast(PushMessage::schedule_created(&schedule));
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        actor: &Actor,
        origin: Option<IpAddr>,
        id: i64,
        request: ScheduleRequest,
    ) -> Result<Schedule, AlarmError> {
        authorize(self.audit.as_ref(), actor, GuardedAction::ManageSchedules, origin).await?;
        request.validate()?;

        let schedule = self
            .schedules
            .update(id, &request, Utc::now())
            .await?
            .ok_or_else(|| schedule_not_found(id))?;
        self.push.broadcast(PushMessage::schedule_updated(&schedule));
        Ok(schedule)
    }

    pub async fn toggle_schedule(
        &self,
        actor: &Actor,
        origin: Option<IpAddr>,
        id: i64,
        enabled: bool,
    ) -> Result<Schedule, AlarmError> {
        authorize(self.audit.as_ref(), actor, GuardedAction::ManageSchedules, origin).await?;

        let schedule = self
            .schedules
            .set_enabled(id, enabled, Utc::now())
            .await?
            .ok_or_else(|| schedule_not_found(id))?;
        self.push.broadcast(PushMessage::schedule_updated(&schedule));
        Ok(schedule)
    }

    pub async fn delete_schedule(
        &self,
        actor: &Actor,
        origin: Option<IpAddr>,
        id: i64,
    ) -> Result<(), AlarmError> {
        authorize(self.audit.as_ref(), actor, GuardedAction::ManageSchedules, origin).await?;

        if !self.schedules.delete(id).await? {
            return Err(schedule_not_found(id));
        }
        tracing::info!(schedule_id = id, "Schedule deleted");
        self.push.broadcast(PushMessage::schedule_deleted(id));
        Ok(())
    }
}

fn sensor_not_found(id: &str) -> AlarmError {
    AlarmError::NotFound(format!("Sensor {} not found", id))
}

fn schedule_not_found(id: i64) -> AlarmError {
    AlarmError::NotFound(format!("Schedule {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActorRole, ScheduleAction};
    use crate::services::memory::{
        InMemoryAuditStore, InMemoryScheduleStore, InMemorySensorStore, RecordingBroadcaster,
    };
    use chrono::NaiveTime;
    use fake::faker::lorem::en::Word;
    use fake::Fake;

    struct Harness {
        service: ConfigurationService,
        audit: Arc<InMemoryAuditStore>,
        push: Arc<RecordingBroadcaster>,
    }

    fn harness() -> Harness {
        let audit = Arc::new(InMemoryAuditStore::new());
        let push = Arc::new(RecordingBroadcaster::new());
        let service = ConfigurationService::new(
            Arc::new(InMemorySensorStore::new()),
            Arc::new(InMemoryScheduleStore::new()),
            audit.clone(),
            push.clone(),
        );
        Harness {
            service,
            audit,
            push,
        }
    }

    fn admin() -> Actor {
        Actor::user(1, ActorRole::Admin)
    }

    fn sensor_request(id: &str) -> CreateSensorRequest {
        let name: String = Word().fake();
        CreateSensorRequest {
            id: id.to_string(),
            name,
            location: Some("Hallway".to_string()),
            sensor_type: "door".to_string(),
            enabled: true,
        }
    }

    fn schedule_request() -> ScheduleRequest {
        ScheduleRequest {
            name: "Weeknights".to_string(),
            action: ScheduleAction::Arm,
            days_of_week: vec![5, 1, 2, 3, 4],
            time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_create_and_toggle_sensor() {
        let h = harness();
        let sensor = h
            .service
            .create_sensor(&admin(), None, sensor_request("door_front"))
            .await
            .unwrap();
        assert!(sensor.enabled);

        let toggled = h
            .service
            .toggle_sensor(&admin(), None, "door_front", false)
            .await
            .unwrap();
        assert!(!toggled.enabled);

        let history = h.audit.recent(10).await.unwrap();
        assert_eq!(history[0].event_type, HistoryEventType::SensorDisabled);
        assert_eq!(history[0].sensor_id.as_deref(), Some("door_front"));
        assert_eq!(h.push.events(), vec![PushMessage::SENSOR_UPDATED; 2]);
    }

    #[tokio::test]
    async fn test_duplicate_sensor_is_conflict() {
        let h = harness();
        h.service
            .create_sensor(&admin(), None, sensor_request("s1"))
            .await
            .unwrap();
        let result = h
            .service
            .create_sensor(&admin(), None, sensor_request("s1"))
            .await;
        assert!(matches!(result, Err(AlarmError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_invalid_sensor_is_rejected() {
        let h = harness();
        let mut request = sensor_request("s1");
        request.name = String::new();
        let result = h.service.create_sensor(&admin(), None, request).await;
        assert!(matches!(result, Err(AlarmError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_sensor_toggle_is_not_found() {
        let h = harness();
        let result = h.service.toggle_sensor(&admin(), None, "nope", true).await;
        assert!(matches!(result, Err(AlarmError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_operator_cannot_manage_schedules() {
        let h = harness();
        let operator = Actor::user(3, ActorRole::Operator);
        let result = h
            .service
            .create_schedule(&operator, None, schedule_request())
            .await;
        assert!(matches!(result, Err(AlarmError::Forbidden(_))));

        let entries = h.audit.recent_security(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, "UNAUTHORIZED_SCHEDULE_CHANGE_ATTEMPT");
        assert!(h.service.list_schedules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_lifecycle() {
        let h = harness();
        let created = h
            .service
            .create_schedule(&admin(), None, schedule_request())
            .await
            .unwrap();
        assert_eq!(created.days_of_week, vec![1, 2, 3, 4, 5]);

        let mut replacement = schedule_request();
        replacement.action = ScheduleAction::Disarm;
        replacement.days_of_week = vec![6, 7];
        let updated = h
            .service
            .update_schedule(&admin(), None, created.id, replacement)
            .await
            .unwrap();
        assert_eq!(updated.action, ScheduleAction::Disarm);

        let toggled = h
            .service
            .toggle_schedule(&admin(), None, created.id, false)
            .await
            .unwrap();
        assert!(!toggled.enabled);

        h.service
            .delete_schedule(&admin(), None, created.id)
            .await
            .unwrap();
        assert!(matches!(
            h.service.delete_schedule(&admin(), None, created.id).await,
            Err(AlarmError::NotFound(_))
        ));

        assert_eq!(
            h.push.events(),
            vec![
                PushMessage::SCHEDULE_CREATED,
                PushMessage::SCHEDULE_UPDATED,
                PushMessage::SCHEDULE_UPDATED,
                PushMessage::SCHEDULE_DELETED,
            ]
        );
    }
}
