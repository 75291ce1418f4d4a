//! Device callback endpoints.
//!
//! Every route sits behind `require_device_auth`, so `DeviceAuth` is read
//! from the request extensions.

use axum::{extract::State, Json};
use domain::models::{
    ConfirmCommandRequest, DeviceStatusReport, DeviceTriggerPayload, HomeAlarm, PollResponse,
    Sensor, SensorDataPayload,
};
use domain::services::BridgeOutcome;
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::DeviceAuth;

/// Result of a trigger or sensor data report.
#[derive(Debug, Serialize)]
pub struct DeviceEventResponse {
    pub alarm: HomeAlarm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<Sensor>,
    pub duplicate: bool,
}

impl From<BridgeOutcome> for DeviceEventResponse {
    fn from(outcome: BridgeOutcome) -> Self {
        Self {
            alarm: outcome.alarm,
            sensor: outcome.sensor,
            duplicate: outcome.duplicate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    /// False when the command was not awaiting a confirmation.
    pub updated: bool,
}

/// POST /api/v1/home-alarm/device/status
pub async fn report_status(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
    Json(report): Json<DeviceStatusReport>,
) -> Result<Json<HomeAlarm>, ApiError> {
    let alarm = state.bridge.on_device_status_report(device, report).await?;
    Ok(Json(alarm))
}

/// POST /api/v1/home-alarm/device/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
    Json(report): Json<DeviceStatusReport>,
) -> Result<Json<HomeAlarm>, ApiError> {
    let alarm = state.bridge.on_device_heartbeat(device, report).await?;
    Ok(Json(alarm))
}

/// POST /api/v1/home-alarm/device/trigger
pub async fn trigger(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
    Json(payload): Json<DeviceTriggerPayload>,
) -> Result<Json<DeviceEventResponse>, ApiError> {
    let outcome = state.bridge.on_device_trigger(device, payload).await?;
    Ok(Json(outcome.into()))
}

/// POST /api/v1/home-alarm/device/sensor-data
pub async fn sensor_data(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
    Json(payload): Json<SensorDataPayload>,
) -> Result<Json<DeviceEventResponse>, ApiError> {
    let outcome = state.bridge.on_sensor_data(device, payload).await?;
    Ok(Json(outcome.into()))
}

/// GET /api/v1/home-alarm/device/commands
///
/// Claims at most one pending command per call.
pub async fn poll_command(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
) -> Result<Json<PollResponse>, ApiError> {
    let response = state
        .bridge
        .outbox()
        .dequeue_next(device.device_id())
        .await?
        .map(PollResponse::from)
        .unwrap_or_else(PollResponse::empty);
    Ok(Json(response))
}

/// POST /api/v1/home-alarm/device/commands/confirm
pub async fn confirm_command(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
    Json(request): Json<ConfirmCommandRequest>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let command_id = request
        .command_id
        .ok_or_else(|| ApiError::Validation("command_id is required".to_string()))?;

    let updated = state
        .bridge
        .outbox()
        .confirm(command_id, device.device_id(), request.success)
        .await?;

    Ok(Json(ConfirmResponse {
        success: true,
        updated,
    }))
}
