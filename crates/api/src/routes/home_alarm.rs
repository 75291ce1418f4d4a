//! Operator endpoints for the home alarm.
//!
//! Reads are open to every authenticated role. Mutations go through the
//! transport bridge or the configuration service, which enforce roles and
//! write the security log.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    CreateSensorRequest, DeviceCommand, EnabledRequest, HistoryEntry, HomeAlarm, OperatorAction,
    Schedule, ScheduleRequest, Sensor, UpdateSensorRequest,
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{ClientOrigin, OperatorAuth};

/// Aggregate with its sensors and schedules.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub alarm: HomeAlarm,
    pub sensors: Vec<Sensor>,
    pub schedules: Vec<Schedule>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CommandsQuery {
    pub device_id: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/v1/home-alarm/status
pub async fn get_status(
    State(state): State<AppState>,
    _auth: OperatorAuth,
) -> Result<Json<StatusResponse>, ApiError> {
    let (alarm, sensors, schedules) = tokio::try_join!(
        state.bridge.current_state(),
        state.configuration.list_sensors(),
        state.configuration.list_schedules(),
    )?;

    Ok(Json(StatusResponse {
        alarm,
        sensors,
        schedules,
    }))
}

async fn operator_command(
    state: &AppState,
    auth: OperatorAuth,
    origin: ClientOrigin,
    action: OperatorAction,
) -> Result<Json<HomeAlarm>, ApiError> {
    let alarm = state
        .bridge
        .on_operator_command(action, auth.actor(), origin.0)
        .await?;
    Ok(Json(alarm))
}

/// POST /api/v1/home-alarm/arm
pub async fn arm(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
) -> Result<Json<HomeAlarm>, ApiError> {
    operator_command(&state, auth, origin, OperatorAction::Arm).await
}

/// POST /api/v1/home-alarm/disarm
pub async fn disarm(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
) -> Result<Json<HomeAlarm>, ApiError> {
    operator_command(&state, auth, origin, OperatorAction::Disarm).await
}

/// POST /api/v1/home-alarm/siren/activate
pub async fn activate_siren(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
) -> Result<Json<HomeAlarm>, ApiError> {
    operator_command(&state, auth, origin, OperatorAction::SirenOn).await
}

/// POST /api/v1/home-alarm/siren/deactivate
pub async fn deactivate_siren(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
) -> Result<Json<HomeAlarm>, ApiError> {
    operator_command(&state, auth, origin, OperatorAction::SirenOff).await
}

/// POST /api/v1/home-alarm/reset-tamper
pub async fn reset_tamper(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
) -> Result<Json<HomeAlarm>, ApiError> {
    operator_command(&state, auth, origin, OperatorAction::ResetTamper).await
}

/// PUT /api/v1/home-alarm/auto-arm
pub async fn set_auto_arm(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Json(request): Json<EnabledRequest>,
) -> Result<Json<HomeAlarm>, ApiError> {
    operator_command(
        &state,
        auth,
        origin,
        OperatorAction::SetAutoArm(request.enabled),
    )
    .await
}

/// GET /api/v1/home-alarm/sensors
pub async fn list_sensors(
    State(state): State<AppState>,
    _auth: OperatorAuth,
) -> Result<Json<Vec<Sensor>>, ApiError> {
    Ok(Json(state.configuration.list_sensors().await?))
}

/// POST /api/v1/home-alarm/sensors
pub async fn create_sensor(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Json(request): Json<CreateSensorRequest>,
) -> Result<(StatusCode, Json<Sensor>), ApiError> {
    let sensor = state
        .configuration
        .create_sensor(&auth.actor(), origin.0, request)
        .await?;
    Ok((StatusCode::CREATED, Json(sensor)))
}

/// PUT /api/v1/home-alarm/sensors/:sensor_id
pub async fn update_sensor(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Path(sensor_id): Path<String>,
    Json(request): Json<UpdateSensorRequest>,
) -> Result<Json<Sensor>, ApiError> {
    let sensor = state
        .configuration
        .update_sensor(&auth.actor(), origin.0, &sensor_id, request)
        .await?;
    Ok(Json(sensor))
}

/// PUT /api/v1/home-alarm/sensors/:sensor_id/toggle
pub async fn toggle_sensor(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Path(sensor_id): Path<String>,
    Json(request): Json<EnabledRequest>,
) -> Result<Json<Sensor>, ApiError> {
    let sensor = state
        .configuration
        .toggle_sensor(&auth.actor(), origin.0, &sensor_id, request.enabled)
        .await?;
    Ok(Json(sensor))
}

/// GET /api/v1/home-alarm/schedules
pub async fn list_schedules(
    State(state): State<AppState>,
    _auth: OperatorAuth,
) -> Result<Json<Vec<Schedule>>, ApiError> {
    Ok(Json(state.configuration.list_schedules().await?))
}

/// POST /api/v1/home-alarm/schedules
pub async fn create_schedule(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Json(request): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<Schedule>), ApiError> {
    let schedule = state
        .configuration
        .create_schedule(&auth.actor(), origin.0, request)
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// PUT /api/v1/home-alarm/schedules/:schedule_id
pub async fn update_schedule(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Path(schedule_id): Path<i64>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<Schedule>, ApiError> {
    let schedule = state
        .configuration
        .update_schedule(&auth.actor(), origin.0, schedule_id, request)
        .await?;
    Ok(Json(schedule))
}

/// PUT /api/v1/home-alarm/schedules/:schedule_id/toggle
pub async fn toggle_schedule(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Path(schedule_id): Path<i64>,
    Json(request): Json<EnabledRequest>,
) -> Result<Json<Schedule>, ApiError> {
    let schedule = state
        .configuration
        .toggle_schedule(&auth.actor(), origin.0, schedule_id, request.enabled)
        .await?;
    Ok(Json(schedule))
}

/// DELETE /api/v1/home-alarm/schedules/:schedule_id
pub async fn delete_schedule(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Path(schedule_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .configuration
        .delete_schedule(&auth.actor(), origin.0, schedule_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/home-alarm/history?limit=N
pub async fn get_history(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let limit = state.config.history_limit(query.limit);
    Ok(Json(state.bridge.history(limit).await?))
}

/// GET /api/v1/home-alarm/commands?device_id=..&limit=..
///
/// Read-only outbox diagnostics, defaulting to the central device.
pub async fn list_commands(
    State(state): State<AppState>,
    auth: OperatorAuth,
    origin: ClientOrigin,
    Query(query): Query<CommandsQuery>,
) -> Result<Json<Vec<DeviceCommand>>, ApiError> {
    let device_id = query
        .device_id
        .unwrap_or_else(|| state.config.alarm.central_device_id.clone());
    let limit = state.config.history_limit(query.limit);
    let commands = state
        .bridge
        .recent_commands(&auth.actor(), origin.0, &device_id, limit)
        .await?;
    Ok(Json(commands))
}
