//! Custom Axum extractors.

pub mod client_origin;
pub mod device_auth;
pub mod operator_auth;

pub use client_origin::ClientOrigin;
pub use device_auth::{DeviceAuth, DEVICE_ID_HEADER, DEVICE_SECRET_HEADER};
pub use operator_auth::OperatorAuth;
