//! Device command outbox model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Delivery status of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Sent,
    Executed,
    Failed,
    Expired,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Sent => "sent",
            CommandStatus::Executed => "executed",
            CommandStatus::Failed => "failed",
            CommandStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "sent" => Ok(CommandStatus::Sent),
            "executed" => Ok(CommandStatus::Executed),
            "failed" => Ok(CommandStatus::Failed),
            "expired" => Ok(CommandStatus::Expired),
            other => Err(format!("unknown command status: {}", other)),
        }
    }
}

/// Command argument. Booleans travel as JSON booleans, everything else as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    Bool(bool),
    Text(String),
}

impl CommandValue {
    /// Textual form used by the outbox table.
    pub fn to_storage(&self) -> String {
        match self {
            CommandValue::Bool(b) => b.to_string(),
            CommandValue::Text(s) => s.clone(),
        }
    }

    pub fn from_storage(raw: &str) -> Self {
        match raw {
            "true" => CommandValue::Bool(true),
            "false" => CommandValue::Bool(false),
            other => CommandValue::Text(other.to_string()),
        }
    }
}

impl From<bool> for CommandValue {
    fn from(b: bool) -> Self {
        CommandValue::Bool(b)
    }
}

/// A command queued for a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub id: Uuid,
    pub device_id: String,
    pub command: String,
    pub value: CommandValue,
    pub metadata: Option<serde_json::Value>,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Input for a new outbox entry.
///
/// The id is chosen up front so the pub/sub copy of the command carries the
/// same id the device later confirms.
#[derive(Debug, Clone)]
pub struct NewDeviceCommand {
    pub id: Uuid,
    pub device_id: String,
    pub command: String,
    pub value: CommandValue,
    pub metadata: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

/// Counts reported by an outbox cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxPurge {
    pub expired: u64,
    pub deleted: u64,
}

/// Command pushed over the pub/sub channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCommand {
    pub command: String,
    pub value: CommandValue,
    pub command_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Response to a device poll.
#[derive(Debug, Clone, Serialize)]
pub struct PollResponse {
    pub has_command: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<CommandValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PollResponse {
    pub fn empty() -> Self {
        Self {
            has_command: false,
            command: None,
            value: None,
            command_id: None,
            metadata: None,
        }
    }
}

impl From<&NewDeviceCommand> for OutboundCommand {
    fn from(cmd: &NewDeviceCommand) -> Self {
        Self {
            command: cmd.command.clone(),
            value: cmd.value.clone(),
            command_id: Some(cmd.id),
            timestamp: Utc::now(),
        }
    }
}

impl From<DeviceCommand> for PollResponse {
    fn from(cmd: DeviceCommand) -> Self {
        Self {
            has_command: true,
            command: Some(cmd.command),
            value: Some(cmd.value),
            command_id: Some(cmd.id),
            metadata: cmd.metadata,
        }
    }
}

/// Device confirmation of an executed command.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmCommandRequest {
    pub command_id: Option<Uuid>,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}
