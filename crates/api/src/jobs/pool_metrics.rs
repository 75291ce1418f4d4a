//! Background job to record connection pool metrics.

use std::time::Duration;

use sqlx::PgPool;

use super::scheduler::Job;

/// Records database pool gauges. Only registered with the postgres backend.
pub struct PoolMetricsJob {
    pool: PgPool,
}

impl PoolMetricsJob {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::observe_pool(&self.pool);
        Ok(())
    }
}
