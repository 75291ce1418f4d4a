//! Command outbox.
//!
//! Durable per-device FIFO used by devices that poll for work. Entries expire
//! after the configured TTL and are never delivered afterwards.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::ports::CommandStore;
use crate::error::AlarmError;
use crate::models::{CommandValue, DeviceCommand, NewDeviceCommand, OutboxPurge};

#[derive(Clone)]
pub struct CommandOutbox {
    store: Arc<dyn CommandStore>,
    ttl: Duration,
}

impl CommandOutbox {
    pub fn new(store: Arc<dyn CommandStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Builds an entry expiring one TTL from now.
    pub fn prepare(
        &self,
        device_id: &str,
        command: &str,
        value: CommandValue,
        metadata: Option<serde_json::Value>,
    ) -> NewDeviceCommand {
        NewDeviceCommand {
            id: Uuid::new_v4(),
            device_id: device_id.to_string(),
            command: command.to_string(),
            value,
            metadata,
            expires_at: Utc::now() + self.ttl,
        }
    }

    /// Queues a command. Pending entries for the same device are not coalesced.
    pub async fn enqueue(
        &self,
        device_id: &str,
        command: &str,
        value: CommandValue,
        metadata: Option<serde_json::Value>,
    ) -> Result<DeviceCommand, AlarmError> {
        let prepared = self.prepare(device_id, command, value, metadata);
        self.enqueue_prepared(&prepared).await
    }

    pub async fn enqueue_prepared(
        &self,
        command: &NewDeviceCommand,
    ) -> Result<DeviceCommand, AlarmError> {
        let queued = self.store.insert(command, Utc::now()).await?;
        metrics::counter!("outbox_commands_enqueued_total", "command" => command.command.clone())
            .increment(1);
        tracing::info!(
            command_id = %queued.id,
            device_id = %queued.device_id,
            command = %queued.command,
            "Command queued"
        );
        Ok(queued)
    }

    /// Claims the oldest unexpired pending command for the device.
    pub async fn dequeue_next(&self, device_id: &str) -> Result<Option<DeviceCommand>, AlarmError> {
        let claimed = self.store.claim_next(device_id, Utc::now()).await?;
        if let Some(cmd) = &claimed {
            metrics::counter!("outbox_commands_delivered_total").increment(1);
            tracing::info!(
                command_id = %cmd.id,
                device_id = %device_id,
                command = %cmd.command,
                "Command delivered"
            );
        }
        Ok(claimed)
    }

    /// Records the device's execution result.
    ///
    /// Unknown ids, commands owned by another device and commands that were
    /// never sent are ignored without error.
    pub async fn confirm(
        &self,
        command_id: Uuid,
        device_id: &str,
        executed: bool,
    ) -> Result<bool, AlarmError> {
        let updated = self
            .store
            .mark_result(command_id, device_id, executed, Utc::now())
            .await?;

        let outcome = if executed { "executed" } else { "failed" };
        if updated {
            metrics::counter!("outbox_commands_confirmed_total", "outcome" => outcome)
                .increment(1);
            tracing::info!(command_id = %command_id, device_id = %device_id, outcome, "Command confirmed");
        } else {
            tracing::debug!(
                command_id = %command_id,
                device_id = %device_id,
                "Ignoring confirmation for a command that is not awaiting one"
            );
        }
        Ok(updated)
    }

    pub async fn recent(&self, device_id: &str, limit: i64) -> Result<Vec<DeviceCommand>, AlarmError> {
        Ok(self.store.list_for_device(device_id, limit).await?)
    }

    /// Deletes rows older than `retention` and marks overdue pending rows expired.
    pub async fn prune(&self, retention: Duration) -> Result<OutboxPurge, AlarmError> {
        let now = Utc::now();
        Ok(self.store.purge(now - retention, now).await?)
    }
}
