//! Integration tests for the device callback API and the command outbox.
//!
//! Run with: cargo test --test home_alarm_device_integration

mod common;

use axum::http::{Method, StatusCode};
use common::{
    device_request, test_config, TestApp, CENTRAL, CENTRAL_SECRET, GARAGE, GARAGE_SECRET,
};
use serde_json::json;

const BASE: &str = "/api/v1/home-alarm";

fn uri(path: &str) -> String {
    format!("{}{}", BASE, path)
}

// ============================================================================
// Device authentication
// ============================================================================

#[tokio::test]
async fn test_missing_credentials_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send(common::anonymous_request(
            Method::GET,
            &uri("/device/commands"),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_wrong_secret_and_unknown_device_look_the_same() {
    let app = TestApp::new();
    let (status_wrong, body_wrong) = app
        .send(device_request(
            Method::GET,
            &uri("/device/commands"),
            CENTRAL,
            "not-the-secret",
            None,
        ))
        .await;
    let (status_unknown, body_unknown) = app
        .send(device_request(
            Method::GET,
            &uri("/device/commands"),
            "intruder_999",
            CENTRAL_SECRET,
            None,
        ))
        .await;

    assert_eq!(status_wrong, StatusCode::UNAUTHORIZED);
    assert_eq!(status_unknown, StatusCode::UNAUTHORIZED);
    assert_eq!(body_wrong, body_unknown);
}

#[tokio::test]
async fn test_rejected_device_changes_nothing() {
    let app = TestApp::new();
    let (status, _) = app
        .send(device_request(
            Method::POST,
            &uri("/device/status"),
            CENTRAL,
            "guess",
            Some(json!({ "alarm_status": "armed" })),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.state.bridge.current_state().await.unwrap().status.as_str(),
        "disarmed"
    );
}

#[tokio::test]
async fn test_operator_token_is_not_a_device_credential() {
    let app = TestApp::new();
    let token = app.token(1, "admin");
    let (status, _) = app
        .send(common::operator_request(
            Method::GET,
            &uri("/device/commands"),
            &token,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Polling and confirmation
// ============================================================================

#[tokio::test]
async fn test_poll_with_empty_outbox() {
    let app = TestApp::new();
    let (status, body) = app.central(Method::GET, &uri("/device/commands"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "has_command": false }));
}

#[tokio::test]
async fn test_poll_delivers_each_command_once_in_order() {
    let app = TestApp::new();
    app.operator(Method::POST, &uri("/arm"), 1, "admin", None)
        .await;
    app.operator(Method::POST, &uri("/siren/activate"), 1, "admin", None)
        .await;

    let (_, first) = app.central(Method::GET, &uri("/device/commands"), None).await;
    assert_eq!(first["has_command"], true);
    assert_eq!(first["command"], "arm");
    assert_eq!(first["value"], true);
    assert!(first["command_id"].is_string());

    let (_, second) = app.central(Method::GET, &uri("/device/commands"), None).await;
    assert_eq!(second["command"], "siren");
    assert_ne!(first["command_id"], second["command_id"]);

    let (_, third) = app.central(Method::GET, &uri("/device/commands"), None).await;
    assert_eq!(third["has_command"], false);
}

#[tokio::test]
async fn test_commands_are_scoped_to_device() {
    let app = TestApp::new();
    app.operator(Method::POST, &uri("/arm"), 1, "admin", None)
        .await;

    let (_, garage) = app
        .send(device_request(
            Method::GET,
            &uri("/device/commands"),
            GARAGE,
            GARAGE_SECRET,
            None,
        ))
        .await;
    assert_eq!(garage["has_command"], false);

    let (_, central) = app.central(Method::GET, &uri("/device/commands"), None).await;
    assert_eq!(central["has_command"], true);
}

#[tokio::test]
async fn test_confirm_executed_is_terminal() {
    let app = TestApp::new();
    app.operator(Method::POST, &uri("/disarm"), 1, "admin", None)
        .await;

    let (_, polled) = app.central(Method::GET, &uri("/device/commands"), None).await;
    let command_id = polled["command_id"].clone();

    let (status, body) = app
        .central(
            Method::POST,
            &uri("/device/commands/confirm"),
            Some(json!({ "command_id": command_id, "success": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], true);

    // A second confirmation is accepted but changes nothing.
    let (status, body) = app
        .central(
            Method::POST,
            &uri("/device/commands/confirm"),
            Some(json!({ "command_id": command_id, "success": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], false);

    let commands = app.state.bridge.outbox().recent(CENTRAL, 10).await.unwrap();
    assert_eq!(commands[0].status.as_str(), "executed");

    let (_, next) = app.central(Method::GET, &uri("/device/commands"), None).await;
    assert_eq!(next["has_command"], false);
}

#[tokio::test]
async fn test_confirm_from_other_device_is_ignored() {
    let app = TestApp::new();
    app.operator(Method::POST, &uri("/arm"), 1, "admin", None)
        .await;
    let (_, polled) = app.central(Method::GET, &uri("/device/commands"), None).await;

    let (status, body) = app
        .send(device_request(
            Method::POST,
            &uri("/device/commands/confirm"),
            GARAGE,
            GARAGE_SECRET,
            Some(json!({ "command_id": polled["command_id"], "success": true })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], false);

    let commands = app.state.bridge.outbox().recent(CENTRAL, 10).await.unwrap();
    assert_eq!(commands[0].status.as_str(), "sent");
}

#[tokio::test]
async fn test_confirm_requires_command_id() {
    let app = TestApp::new();
    let (status, body) = app
        .central(
            Method::POST,
            &uri("/device/commands/confirm"),
            Some(json!({ "success": true })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_expired_command_is_never_delivered() {
    let mut config = test_config();
    config.alarm.command_ttl_secs = -1;
    let app = TestApp::with_config(config);
    app.operator(Method::POST, &uri("/arm"), 1, "admin", None)
        .await;

    let (_, polled) = app.central(Method::GET, &uri("/device/commands"), None).await;
    assert_eq!(polled["has_command"], false);
}

// ============================================================================
// Device reports
// ============================================================================

#[tokio::test]
async fn test_status_report_updates_aggregate() {
    let app = TestApp::new();
    let (status, body) = app
        .central(
            Method::POST,
            &uri("/device/status"),
            Some(json!({ "alarm_armed": true, "siren_active": false, "wifi_rssi": -60 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "armed");
    assert!(body["last_device_contact_at"].is_string());
}

#[tokio::test]
async fn test_heartbeat_never_changes_status() {
    let app = TestApp::new();
    let (status, body) = app
        .central(
            Method::POST,
            &uri("/device/heartbeat"),
            Some(json!({ "alarm_armed": true, "siren_state": 0, "uptime": 1200 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disarmed");
}

#[tokio::test]
async fn test_tamper_trigger_sounds_siren() {
    let app = TestApp::new();
    let (status, body) = app
        .central(
            Method::POST,
            &uri("/device/trigger"),
            Some(json!({ "event_type": "tamper_activated", "tamper_state": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alarm"]["tamper_triggered"], true);
    assert_eq!(body["alarm"]["siren_status"], "on");

    let (status, body) = app
        .operator(Method::POST, &uri("/reset-tamper"), 1, "admin", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tamper_triggered"], false);
}

#[tokio::test]
async fn test_trigger_for_unknown_sensor_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app
        .central(
            Method::POST,
            &uri("/device/trigger"),
            Some(json!({ "sensor_id": "ghost", "triggered": true })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_repeated_trigger_is_marked_duplicate() {
    let app = TestApp::new();
    app.operator(
        Method::POST,
        &uri("/sensors"),
        1,
        "admin",
        Some(json!({ "id": "door_back", "name": "Back door" })),
    )
    .await;

    let report = json!({ "sensor_id": "door_back", "triggered": true });
    let (_, first) = app
        .central(Method::POST, &uri("/device/trigger"), Some(report.clone()))
        .await;
    let (_, second) = app
        .central(Method::POST, &uri("/device/trigger"), Some(report))
        .await;
    assert_eq!(first["duplicate"], false);
    assert_eq!(second["duplicate"], true);

    let history = app.state.bridge.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_trigger_after_telemetry_trips_armed_alarm() {
    let app = TestApp::new();
    app.operator(
        Method::POST,
        &uri("/sensors"),
        1,
        "admin",
        Some(json!({ "id": "window_kitchen", "name": "Kitchen window" })),
    )
    .await;
    app.operator(Method::POST, &uri("/arm"), 1, "admin", None)
        .await;

    app.central(
        Method::POST,
        &uri("/device/sensor-data"),
        Some(json!({ "sensor_id": "window_kitchen", "triggered": true })),
    )
    .await;
    let (status, body) = app
        .central(
            Method::POST,
            &uri("/device/trigger"),
            Some(json!({ "sensor_id": "window_kitchen", "triggered": true })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["alarm"]["status"], "triggered");
    assert_eq!(body["alarm"]["siren_status"], "on");
}

#[tokio::test]
async fn test_report_before_arming_does_not_mask_intrusion() {
    let app = TestApp::new();
    app.operator(
        Method::POST,
        &uri("/sensors"),
        1,
        "admin",
        Some(json!({ "id": "door_front", "name": "Front door" })),
    )
    .await;

    let report = json!({ "sensor_id": "door_front", "triggered": true });
    app.central(Method::POST, &uri("/device/trigger"), Some(report.clone()))
        .await;
    app.operator(Method::POST, &uri("/arm"), 1, "admin", None)
        .await;
    let (_, body) = app
        .central(Method::POST, &uri("/device/trigger"), Some(report))
        .await;

    assert_eq!(body["duplicate"], false);
    assert_eq!(body["alarm"]["status"], "triggered");

    let status = app.state.bridge.current_state().await.unwrap();
    assert!(status.triggered_at.is_some());
}

#[tokio::test]
async fn test_sensor_data_updates_sensor_only() {
    let app = TestApp::new();
    app.operator(
        Method::POST,
        &uri("/sensors"),
        1,
        "admin",
        Some(json!({ "id": "motion_hall", "name": "Hall motion", "sensor_type": "motion" })),
    )
    .await;
    app.operator(Method::POST, &uri("/arm"), 1, "admin", None)
        .await;

    let (status, body) = app
        .central(
            Method::POST,
            &uri("/device/sensor-data"),
            Some(json!({ "sensor_id": "motion_hall", "triggered": true, "rssi": -70 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sensor"]["triggered"], true);
    assert_eq!(body["alarm"]["status"], "armed");

    // Only the arm entry; telemetry is not audited.
    assert_eq!(app.state.bridge.history(10).await.unwrap().len(), 1);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_device_rate_limit() {
    let mut config = test_config();
    config.security.device_rate_limit_per_minute = 2;
    let app = TestApp::with_config(config);

    for _ in 0..2 {
        let (status, _) = app.central(Method::GET, &uri("/device/commands"), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app.central(Method::GET, &uri("/device/commands"), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    // Buckets are per device.
    let (status, _) = app
        .send(device_request(
            Method::GET,
            &uri("/device/commands"),
            GARAGE,
            GARAGE_SECRET,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}
