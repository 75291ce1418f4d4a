use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use domain::services::CommandPublisher;
use tokio::sync::watch;
use tracing::{info, warn};

use home_alarm_api::app::{self, AppState, Stores};
use home_alarm_api::config::{Config, StorageBackend};
use home_alarm_api::jobs::{
    AutoArmJob, JobScheduler, OutboxCleanupJob, PoolMetricsJob, RateLimitPruneJob,
};
use home_alarm_api::middleware;
use home_alarm_api::services::mqtt;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = %config.storage.backend,
        devices = config.devices.len(),
        "Starting home alarm bridge"
    );

    let (stores, pool) = match config.storage.backend {
        StorageBackend::Postgres => {
            let db_config: persistence::db::DatabaseConfig = (&config.database).into();
            let pool = persistence::db::create_pool(&db_config).await?;
            info!("Running database migrations...");
            sqlx::migrate!("../persistence/src/migrations")
                .run(&pool)
                .await?;
            info!("Migrations completed");
            (Stores::postgres(pool.clone()), Some(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, alarm state is lost on restart");
            (Stores::in_memory(), None)
        }
    };

    let (mqtt_publisher, mqtt_listener) = if config.mqtt.enabled {
        let (publisher, listener) = mqtt::connect(&config.mqtt);
        (
            Some(Arc::new(publisher) as Arc<dyn CommandPublisher>),
            Some(listener),
        )
    } else {
        info!("MQTT disabled, commands are delivered through the outbox only");
        (None, None)
    };

    let state = AppState::new(config.clone(), stores, pool.clone(), mqtt_publisher)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mqtt_handle = mqtt_listener.map(|listener| {
        listener.spawn(
            state.bridge.clone(),
            state.device_gate.clone(),
            shutdown_rx.clone(),
        )
    });

    let mut scheduler = JobScheduler::new();
    scheduler.register(OutboxCleanupJob::new(
        state.bridge.clone(),
        config.outbox.retention_days,
        config.outbox.cleanup_interval_minutes,
    ));
    scheduler.register(AutoArmJob::new(
        state.bridge.clone(),
        state.configuration.clone(),
    ));
    if let Some(limiter) = state.rate_limiter.clone() {
        scheduler.register(RateLimitPruneJob::new(limiter));
    }
    if let Some(pool) = pool {
        scheduler.register(PoolMetricsJob::new(pool));
    }
    scheduler.start();

    let app = app::create_app(state);

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped, shutting down background tasks");
    let _ = shutdown_tx.send(true);
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;
    if let Some(handle) = mqtt_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("MQTT listener did not stop in time");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
