use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use chrono::Duration as ChronoDuration;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::memory::{
    InMemoryAlarmStore, InMemoryAuditStore, InMemoryCommandStore, InMemoryScheduleStore,
    InMemorySensorStore,
};
use domain::services::{
    AlarmStore, AuditStore, BridgeSettings, CommandOutbox, CommandPublisher, CommandStore,
    ConfigurationService, DeviceAuthGate, DeviceCredentialStore, PushHub, ScheduleStore,
    SensorStore, TransportBridge,
};
use persistence::repositories::{
    AlarmAuditRepository, DeviceCommandRepository, HomeAlarmRepository, ScheduleRepository,
    SensorRepository,
};
use shared::jwt::{JwtError, TokenVerifier};

use crate::config::Config;
use crate::middleware::{
    device_rate_limit_middleware, metrics_handler, metrics_middleware, require_device_auth,
    security_headers_middleware, trace_id, RateLimiterState,
};
use crate::routes::{health, home_alarm, home_alarm_device, live};

/// Store implementations behind the domain ports.
#[derive(Clone)]
pub struct Stores {
    pub alarm: Arc<dyn AlarmStore>,
    pub sensors: Arc<dyn SensorStore>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub commands: Arc<dyn CommandStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            alarm: Arc::new(HomeAlarmRepository::new(pool.clone())),
            sensors: Arc::new(SensorRepository::new(pool.clone())),
            schedules: Arc::new(ScheduleRepository::new(pool.clone())),
            commands: Arc::new(DeviceCommandRepository::new(pool.clone())),
            audit: Arc::new(AlarmAuditRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            alarm: Arc::new(InMemoryAlarmStore::new()),
            sensors: Arc::new(InMemorySensorStore::new()),
            schedules: Arc::new(InMemoryScheduleStore::new()),
            commands: Arc::new(InMemoryCommandStore::new()),
            audit: Arc::new(InMemoryAuditStore::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub bridge: Arc<TransportBridge>,
    pub configuration: Arc<ConfigurationService>,
    pub push: Arc<PushHub>,
    pub device_gate: Arc<DeviceAuthGate>,
    pub token_verifier: Arc<TokenVerifier>,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
    /// Present with the postgres backend; used by readiness checks.
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Wires the bridge, configuration service and push hub over `stores`.
    pub fn new(
        config: Config,
        stores: Stores,
        pool: Option<PgPool>,
        publisher: Option<Arc<dyn CommandPublisher>>,
    ) -> Result<Self, JwtError> {
        let token_verifier =
            TokenVerifier::from_rsa_pem(&config.jwt.public_key, config.jwt.leeway_secs)?;
        Ok(Self::with_verifier(
            config,
            stores,
            pool,
            publisher,
            token_verifier,
        ))
    }

    pub fn with_verifier(
        config: Config,
        stores: Stores,
        pool: Option<PgPool>,
        publisher: Option<Arc<dyn CommandPublisher>>,
        token_verifier: TokenVerifier,
    ) -> Self {
        let push = Arc::new(PushHub::default());
        let outbox = CommandOutbox::new(
            stores.commands.clone(),
            ChronoDuration::seconds(config.alarm.command_ttl_secs),
        );
        let settings = BridgeSettings {
            central_device_id: config.alarm.central_device_id.clone(),
            trigger_dedup_window: ChronoDuration::milliseconds(
                config.alarm.trigger_dedup_window_ms.max(0),
            ),
        };

        let mut bridge = TransportBridge::new(
            stores.alarm.clone(),
            stores.sensors.clone(),
            stores.audit.clone(),
            outbox,
            push.clone(),
            settings,
        );
        if let Some(publisher) = publisher {
            bridge = bridge.with_publisher(publisher);
        }

        let configuration = ConfigurationService::new(
            stores.sensors,
            stores.schedules,
            stores.audit,
            push.clone(),
        );

        let device_gate =
            DeviceAuthGate::new(DeviceCredentialStore::new(config.devices.clone()));
        let rate_limiter =
            RateLimiterState::new(config.security.device_rate_limit_per_minute).map(Arc::new);

        Self {
            config: Arc::new(config),
            bridge: Arc::new(bridge),
            configuration: Arc::new(configuration),
            push,
            device_gate: Arc::new(device_gate),
            token_verifier: Arc::new(token_verifier),
            rate_limiter,
            pool,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Operator routes authenticate per handler through the OperatorAuth extractor.
    let operator_routes = Router::new()
        .route("/api/v1/home-alarm/status", get(home_alarm::get_status))
        .route("/api/v1/home-alarm/arm", post(home_alarm::arm))
        .route("/api/v1/home-alarm/disarm", post(home_alarm::disarm))
        .route(
            "/api/v1/home-alarm/siren/activate",
            post(home_alarm::activate_siren),
        )
        .route(
            "/api/v1/home-alarm/siren/deactivate",
            post(home_alarm::deactivate_siren),
        )
        .route(
            "/api/v1/home-alarm/reset-tamper",
            post(home_alarm::reset_tamper),
        )
        .route("/api/v1/home-alarm/auto-arm", put(home_alarm::set_auto_arm))
        .route(
            "/api/v1/home-alarm/sensors",
            get(home_alarm::list_sensors).post(home_alarm::create_sensor),
        )
        .route(
            "/api/v1/home-alarm/sensors/:sensor_id",
            put(home_alarm::update_sensor),
        )
        .route(
            "/api/v1/home-alarm/sensors/:sensor_id/toggle",
            put(home_alarm::toggle_sensor),
        )
        .route(
            "/api/v1/home-alarm/schedules",
            get(home_alarm::list_schedules).post(home_alarm::create_schedule),
        )
        .route(
            "/api/v1/home-alarm/schedules/:schedule_id",
            put(home_alarm::update_schedule).delete(home_alarm::delete_schedule),
        )
        .route(
            "/api/v1/home-alarm/schedules/:schedule_id/toggle",
            put(home_alarm::toggle_schedule),
        )
        .route("/api/v1/home-alarm/history", get(home_alarm::get_history))
        .route("/api/v1/home-alarm/commands", get(home_alarm::list_commands))
        .route("/api/v1/home-alarm/ws", get(live::ws_handler));

    // Device routes: auth runs first (outermost), then the per-device limit.
    let device_routes = Router::new()
        .route(
            "/api/v1/home-alarm/device/status",
            post(home_alarm_device::report_status),
        )
        .route(
            "/api/v1/home-alarm/device/heartbeat",
            post(home_alarm_device::heartbeat),
        )
        .route(
            "/api/v1/home-alarm/device/trigger",
            post(home_alarm_device::trigger),
        )
        .route(
            "/api/v1/home-alarm/device/sensor-data",
            post(home_alarm_device::sensor_data),
        )
        .route(
            "/api/v1/home-alarm/device/commands",
            get(home_alarm_device::poll_command),
        )
        .route(
            "/api/v1/home-alarm/device/commands/confirm",
            post(home_alarm_device::confirm_command),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            device_rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_device_auth,
        ));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(operator_routes)
        .merge(device_routes)
        // Global middleware (bottom layers run first)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
