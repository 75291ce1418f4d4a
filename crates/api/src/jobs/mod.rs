//! Background job scheduler and job implementations.

mod auto_arm;
mod outbox_cleanup;
mod pool_metrics;
mod rate_limit_prune;
mod scheduler;

pub use auto_arm::AutoArmJob;
pub use outbox_cleanup::OutboxCleanupJob;
pub use pool_metrics::PoolMetricsJob;
pub use rate_limit_prune::RateLimitPruneJob;
pub use scheduler::JobScheduler;
