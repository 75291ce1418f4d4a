//! Device authentication gate.
//!
//! Devices present `(device_id, secret)` on every HTTP callback and every
//! pub/sub message. This is separate from operator authentication: a device
//! identity never carries a user identity or role.

use std::collections::HashMap;

use shared::crypto::secrets_match;
use thiserror::Error;

use crate::models::AuthenticatedDevice;

/// Reason a device credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceAuthError {
    #[error("Missing device credentials")]
    MissingCredentials,

    #[error("Unknown device")]
    UnknownDevice,

    #[error("Invalid device secret")]
    InvalidSecret,
}

/// Static mapping of device id to shared secret.
#[derive(Clone, Default)]
pub struct DeviceCredentialStore {
    secrets: HashMap<String, String>,
}

impl std::fmt::Debug for DeviceCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.secrets.keys().collect();
        ids.sort();
        f.debug_struct("DeviceCredentialStore")
            .field("devices", &ids)
            .finish()
    }
}

impl DeviceCredentialStore {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.secrets.contains_key(device_id)
    }

    fn secret_for(&self, device_id: &str) -> Option<&str> {
        self.secrets.get(device_id).map(String::as_str)
    }
}

/// Validates device credentials. Fails closed.
#[derive(Debug, Clone)]
pub struct DeviceAuthGate {
    credentials: DeviceCredentialStore,
}

impl DeviceAuthGate {
    pub fn new(credentials: DeviceCredentialStore) -> Self {
        Self { credentials }
    }

    pub fn authenticate(
        &self,
        device_id: Option<&str>,
        secret: Option<&str>,
    ) -> Result<AuthenticatedDevice, DeviceAuthError> {
        let (device_id, secret) = match (device_id, secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => (id, secret),
            _ => {
                metrics::counter!("device_auth_failures_total", "reason" => "missing").increment(1);
                tracing::warn!(device_id = ?device_id, "Device request without credentials");
                return Err(DeviceAuthError::MissingCredentials);
            }
        };

        let Some(expected) = self.credentials.secret_for(device_id) else {
            metrics::counter!("device_auth_failures_total", "reason" => "unknown_device")
                .increment(1);
            tracing::warn!(device_id = %device_id, "Unknown device attempted to authenticate");
            return Err(DeviceAuthError::UnknownDevice);
        };

        if !secrets_match(expected, secret) {
            metrics::counter!("device_auth_failures_total", "reason" => "invalid_secret")
                .increment(1);
            tracing::warn!(
                device_id = %device_id,
                reason = "invalid_secret",
                "Device presented an invalid secret"
            );
            return Err(DeviceAuthError::InvalidSecret);
        }

        Ok(AuthenticatedDevice::new(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> DeviceAuthGate {
        let mut secrets = HashMap::new();
        secrets.insert(
            "home_alarm_central_001".to_string(),
            "device_secret_key_001".to_string(),
        );
        secrets.insert(
            "sensor_sala_001".to_string(),
            "device_secret_key_003".to_string(),
        );
        DeviceAuthGate::new(DeviceCredentialStore::new(secrets))
    }

    #[test]
    fn test_valid_credentials() {
        let device = gate()
            .authenticate(Some("home_alarm_central_001"), Some("device_secret_key_001"))
            .unwrap();
        assert_eq!(device.device_id(), "home_alarm_central_001");
    }

    #[test]
    fn test_unknown_device() {
        assert_eq!(
            gate().authenticate(Some("garage_door"), Some("device_secret_key_001")),
            Err(DeviceAuthError::UnknownDevice)
        );
    }

    #[test]
    fn test_secret_of_another_device_is_rejected() {
        assert_eq!(
            gate().authenticate(Some("home_alarm_central_001"), Some("device_secret_key_003")),
            Err(DeviceAuthError::InvalidSecret)
        );
    }

    #[test]
    fn test_missing_or_empty_credentials() {
        let gate = gate();
        assert_eq!(
            gate.authenticate(None, Some("x")),
            Err(DeviceAuthError::MissingCredentials)
        );
        assert_eq!(
            gate.authenticate(Some("home_alarm_central_001"), Some("")),
            Err(DeviceAuthError::MissingCredentials)
        );
    }

    #[test]
    fn test_empty_store_rejects_everything() {
        let gate = DeviceAuthGate::new(DeviceCredentialStore::default());
        assert!(gate.authenticate(Some("a"), Some("b")).is_err());
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let output = format!("{:?}", gate());
        assert!(output.contains("home_alarm_central_001"));
        assert!(!output.contains("device_secret_key_001"));
    }
}
