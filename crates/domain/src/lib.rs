//! Domain layer for the home alarm backend.
//!
//! This crate contains:
//! - Domain models (alarm aggregate, sensors, schedules, commands, history)
//! - The alarm state machine and the transport bridge that drives it
//! - Store and notification ports implemented by the persistence and api crates
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::{AlarmError, StoreError};
