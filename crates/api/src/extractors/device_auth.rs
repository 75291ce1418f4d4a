//! Device credential extractor.
//!
//! Devices send `X-Device-ID` and `X-Device-Secret` on every callback.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use domain::models::AuthenticatedDevice;

use crate::app::AppState;
use crate::error::ApiError;

pub const DEVICE_ID_HEADER: &str = "X-Device-ID";
pub const DEVICE_SECRET_HEADER: &str = "X-Device-Secret";

/// A device that passed the authentication gate.
#[derive(Debug, Clone)]
pub struct DeviceAuth(pub AuthenticatedDevice);

impl DeviceAuth {
    /// Checks the credential headers against the gate.
    pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Self, ApiError> {
        let device_id = headers.get(DEVICE_ID_HEADER).and_then(|v| v.to_str().ok());
        let secret = headers
            .get(DEVICE_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());

        let device = state.device_gate.authenticate(device_id, secret)?;
        Ok(Self(device))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for DeviceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Already checked by the device auth middleware.
        if let Some(device) = parts.extensions.get::<AuthenticatedDevice>() {
            return Ok(Self(device.clone()));
        }

        Self::authenticate(state, &parts.headers)
    }
}
