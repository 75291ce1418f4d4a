//! Device authentication middleware.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::extractors::DeviceAuth;

/// Rejects requests without valid device credentials and stores the
/// authenticated device in request extensions.
pub async fn require_device_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match DeviceAuth::authenticate(&state, req.headers()) {
        Ok(DeviceAuth(device)) => {
            req.extensions_mut().insert(device);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
