//! Background job that drops idle per-device rate limiter entries.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::scheduler::Job;
use crate::middleware::RateLimiterState;

pub struct RateLimitPruneJob {
    limiter: Arc<RateLimiterState>,
}

impl RateLimitPruneJob {
    pub fn new(limiter: Arc<RateLimiterState>) -> Self {
        Self { limiter }
    }
}

#[async_trait::async_trait]
impl Job for RateLimitPruneJob {
    fn name(&self) -> &'static str {
        "rate_limit_prune"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(5 * 60)
    }

    async fn execute(&self) -> Result<(), String> {
        self.limiter.prune();
        debug!(tracked = self.limiter.tracked_devices(), "Rate limiter pruned");
        Ok(())
    }
}
