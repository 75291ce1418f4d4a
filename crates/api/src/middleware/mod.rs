//! HTTP middleware components.

pub mod device_auth;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod security_headers;
pub mod trace_id;

pub use device_auth::require_device_auth;
pub use metrics::{init_metrics, metrics_handler, metrics_middleware};
pub use rate_limit::{device_rate_limit_middleware, RateLimiterState};
pub use security_headers::security_headers_middleware;
pub use trace_id::{trace_id, RequestId, REQUEST_ID_HEADER};
