//! Background job that prunes the command outbox.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use domain::services::TransportBridge;
use tracing::info;

use super::scheduler::Job;

/// Marks overdue pending commands expired and deletes rows past retention.
pub struct OutboxCleanupJob {
    bridge: Arc<TransportBridge>,
    retention_days: i64,
    interval_minutes: u64,
}

impl OutboxCleanupJob {
    pub fn new(bridge: Arc<TransportBridge>, retention_days: i64, interval_minutes: u64) -> Self {
        Self {
            bridge,
            retention_days,
            interval_minutes: interval_minutes.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Job for OutboxCleanupJob {
    fn name(&self) -> &'static str {
        "outbox_cleanup"
    }

    fn period(&self) -> StdDuration {
        StdDuration::from_secs(self.interval_minutes * 60)
    }

    async fn execute(&self) -> Result<(), String> {
        let purge = self
            .bridge
            .outbox()
            .prune(Duration::days(self.retention_days))
            .await
            .map_err(|e| format!("Failed to prune command outbox: {}", e))?;

        metrics::counter!("outbox_commands_expired_total").increment(purge.expired);
        metrics::counter!("outbox_commands_deleted_total").increment(purge.deleted);
        info!(
            expired = purge.expired,
            deleted = purge.deleted,
            retention_days = self.retention_days,
            "Command outbox pruned"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{CommandStatus, CommandValue};
    use domain::services::memory::{
        InMemoryAlarmStore, InMemoryAuditStore, InMemoryCommandStore, InMemorySensorStore,
    };
    use domain::services::{BridgeSettings, CommandOutbox, PushHub};

    fn bridge(ttl: Duration) -> Arc<TransportBridge> {
        let outbox = CommandOutbox::new(Arc::new(InMemoryCommandStore::new()), ttl);
        Arc::new(TransportBridge::new(
            Arc::new(InMemoryAlarmStore::new()),
            Arc::new(InMemorySensorStore::new()),
            Arc::new(InMemoryAuditStore::new()),
            outbox,
            Arc::new(PushHub::new(4)),
            BridgeSettings::default(),
        ))
    }

    #[test]
    fn test_period_has_floor() {
        let job = OutboxCleanupJob::new(bridge(Duration::minutes(5)), 7, 0);
        assert_eq!(job.period().as_secs(), 60);
        assert_eq!(job.name(), "outbox_cleanup");
    }

    #[tokio::test]
    async fn test_execute_expires_overdue_commands() {
        // Negative ttl: every queued command is already overdue.
        let bridge = bridge(Duration::seconds(-1));
        let queued = bridge
            .outbox()
            .enqueue("central", "arm", CommandValue::Bool(true), None)
            .await
            .unwrap();

        let job = OutboxCleanupJob::new(bridge.clone(), 7, 60);
        job.execute().await.unwrap();

        let recent = bridge.outbox().recent("central", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, queued.id);
        assert_eq!(recent[0].status, CommandStatus::Expired);
    }
}
