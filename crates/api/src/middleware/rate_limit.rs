//! Per-device rate limiting for the device callback routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use domain::models::AuthenticatedDevice;
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use serde_json::json;
use std::num::NonZeroU32;

use crate::app::AppState;

/// Token buckets keyed by device id.
pub struct RateLimiterState {
    limiter: DefaultKeyedRateLimiter<String>,
    rate_limit_per_minute: u32,
}

impl RateLimiterState {
    /// Returns `None` when the limit is 0 (disabled).
    pub fn new(rate_limit_per_minute: u32) -> Option<Self> {
        let per_minute = NonZeroU32::new(rate_limit_per_minute)?;
        Some(Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            rate_limit_per_minute,
        })
    }

    /// Ok if allowed, otherwise the retry-after in seconds.
    pub fn check(&self, device_id: &str) -> Result<(), u64> {
        self.limiter
            .check_key(&device_id.to_string())
            .map_err(|not_until| {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                wait.as_secs().max(1)
            })
    }

    /// Drops buckets that are back to full capacity.
    pub fn prune(&self) {
        self.limiter.retain_recent();
    }

    pub fn tracked_devices(&self) -> usize {
        self.limiter.len()
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("tracked_devices", &self.tracked_devices())
            .finish()
    }
}

/// Applies the per-device limit.
///
/// Runs after device authentication so only verified ids get a bucket.
pub async fn device_rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(rate_limiter) = state.rate_limiter.as_ref() else {
        return next.run(req).await;
    };
    let Some(device) = req.extensions().get::<AuthenticatedDevice>() else {
        return next.run(req).await;
    };

    if let Err(retry_after) = rate_limiter.check(device.device_id()) {
        metrics::counter!("device_rate_limited_total").increment(1);
        tracing::warn!(device_id = %device.device_id(), retry_after, "Device rate limited");
        return rate_limited_response(rate_limiter.rate_limit_per_minute, retry_after);
    }

    next.run(req).await
}

fn rate_limited_response(limit: u32, retry_after: u64) -> Response {
    let body = json!({
        "error": "rate_limited",
        "message": format!("Rate limit of {} requests/minute exceeded", limit),
        "retry_after": retry_after
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
