//! Role checks for state-changing operator calls.
//!
//! Every refused attempt writes exactly one warning to the security log.
//! Successful operator commands write one informational entry.

use std::net::IpAddr;

use chrono::Utc;
use serde_json::json;

use super::ports::AuditStore;
use crate::error::AlarmError;
use crate::models::{Actor, ActorRole, NewSecurityEvent, OperatorAction, SecurityLevel};

/// An operation that needs more than read access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedAction {
    Operator(OperatorAction),
    ManageSensors,
    ManageSchedules,
    InspectOutbox,
}

impl GuardedAction {
    pub fn name(&self) -> &'static str {
        match self {
            GuardedAction::Operator(action) => action.name(),
            GuardedAction::ManageSensors => "manage_sensors",
            GuardedAction::ManageSchedules => "manage_schedules",
            GuardedAction::InspectOutbox => "inspect_outbox",
        }
    }

    pub fn allows(&self, role: ActorRole) -> bool {
        match role {
            ActorRole::Admin => true,
            ActorRole::System => matches!(
                self,
                GuardedAction::Operator(OperatorAction::Arm | OperatorAction::Disarm)
            ),
            ActorRole::Operator | ActorRole::Viewer => false,
        }
    }

    /// Security log code for a refused attempt.
    pub fn denied_code(&self) -> &'static str {
        match self {
            GuardedAction::Operator(OperatorAction::Arm) => "UNAUTHORIZED_ALARM_ARM_ATTEMPT",
            GuardedAction::Operator(OperatorAction::Disarm) => "UNAUTHORIZED_ALARM_DISARM_ATTEMPT",
            GuardedAction::Operator(OperatorAction::SirenOn) => {
                "UNAUTHORIZED_SIREN_ACTIVATION_ATTEMPT"
            }
            GuardedAction::Operator(OperatorAction::SirenOff) => {
                "UNAUTHORIZED_SIREN_DEACTIVATION_ATTEMPT"
            }
            GuardedAction::Operator(OperatorAction::ResetTamper) => {
                "UNAUTHORIZED_TAMPER_RESET_ATTEMPT"
            }
            GuardedAction::Operator(OperatorAction::SetAutoArm(_)) => {
                "UNAUTHORIZED_AUTO_ARM_CHANGE_ATTEMPT"
            }
            GuardedAction::ManageSensors => "UNAUTHORIZED_SENSOR_CHANGE_ATTEMPT",
            GuardedAction::ManageSchedules => "UNAUTHORIZED_SCHEDULE_CHANGE_ATTEMPT",
            GuardedAction::InspectOutbox => "UNAUTHORIZED_OUTBOX_ACCESS_ATTEMPT",
        }
    }
}

/// Security log code for a successful operator command.
pub fn success_code(action: OperatorAction) -> &'static str {
    match action {
        OperatorAction::Arm => "ALARM_ARMED",
        OperatorAction::Disarm => "ALARM_DISARMED",
        OperatorAction::SirenOn => "SIREN_ACTIVATED_MANUAL",
        OperatorAction::SirenOff => "SIREN_DEACTIVATED_MANUAL",
        OperatorAction::ResetTamper => "TAMPER_RESET",
        OperatorAction::SetAutoArm(_) => "AUTO_ARM_CHANGED",
    }
}

/// Fails with `Forbidden` unless `actor` may perform `action`.
///
/// A refusal is written to the security log before returning. A failing log
/// write is reported but never turns the refusal into an allow.
pub async fn authorize(
    audit: &dyn AuditStore,
    actor: &Actor,
    action: GuardedAction,
    origin: Option<IpAddr>,
) -> Result<(), AlarmError> {
    if action.allows(actor.role) {
        return Ok(());
    }

    metrics::counter!("operator_forbidden_total", "action" => action.name()).increment(1);
    tracing::warn!(
        actor_id = ?actor.id,
        role = %actor.role,
        action = action.name(),
        origin = ?origin,
        "Refused operator action"
    );

    let event = NewSecurityEvent {
        level: SecurityLevel::Warning,
        code: action.denied_code().to_string(),
        message: format!(
            "{} attempted {} without the admin role",
            actor.role,
            action.name()
        ),
        actor_id: actor.id,
        actor_role: Some(actor.role.to_string()),
        origin: origin.map(|ip| ip.to_string()),
        metadata: Some(json!({ "action": action.name() })),
    };
    if let Err(e) = audit.append_security(&event, Utc::now()).await {
        tracing::error!(error = %e, code = action.denied_code(), "Failed to write security log entry");
    }

    Err(AlarmError::Forbidden(format!(
        "The {} action requires the admin role",
        action.name()
    )))
}

/// Writes the informational entry for a completed operator command.
pub async fn record_success(
    audit: &dyn AuditStore,
    actor: &Actor,
    action: OperatorAction,
    origin: Option<IpAddr>,
) {
    let event = NewSecurityEvent {
        level: SecurityLevel::Info,
        code: success_code(action).to_string(),
        message: format!("{} performed by {}", action.name(), actor.role),
        actor_id: actor.id,
        actor_role: Some(actor.role.to_string()),
        origin: origin.map(|ip| ip.to_string()),
        metadata: Some(json!({ "action": action.name() })),
    };
    if let Err(e) = audit.append_security(&event, Utc::now()).await {
        tracing::error!(error = %e, code = success_code(action), "Failed to write security log entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::InMemoryAuditStore;

    #[test]
    fn test_role_matrix() {
        let arm = GuardedAction::Operator(OperatorAction::Arm);
        let siren = GuardedAction::Operator(OperatorAction::SirenOn);

        assert!(arm.allows(ActorRole::Admin));
        assert!(arm.allows(ActorRole::System));
        assert!(!arm.allows(ActorRole::Operator));
        assert!(!arm.allows(ActorRole::Viewer));

        assert!(siren.allows(ActorRole::Admin));
        assert!(!siren.allows(ActorRole::System));
        assert!(!GuardedAction::ManageSchedules.allows(ActorRole::System));
    }

    #[tokio::test]
    async fn test_refusal_writes_one_security_entry() {
        let audit = InMemoryAuditStore::new();
        let actor = Actor::user(9, ActorRole::Viewer);
        let origin: IpAddr = "10.0.0.7".parse().unwrap();

        let result = authorize(
            &audit,
            &actor,
            GuardedAction::Operator(OperatorAction::ResetTamper),
            Some(origin),
        )
        .await;
        assert!(matches!(result, Err(AlarmError::Forbidden(_))));

        let entries = audit.recent_security(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, "UNAUTHORIZED_TAMPER_RESET_ATTEMPT");
        assert_eq!(entries[0].level, SecurityLevel::Warning);
        assert_eq!(entries[0].actor_id, Some(9));
        assert_eq!(entries[0].origin.as_deref(), Some("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_allowed_action_writes_nothing() {
        let audit = InMemoryAuditStore::new();
        authorize(
            &audit,
            &Actor::user(1, ActorRole::Admin),
            GuardedAction::ManageSensors,
            None,
        )
        .await
        .unwrap();
        assert!(audit.recent_security(10).await.unwrap().is_empty());
    }
}
