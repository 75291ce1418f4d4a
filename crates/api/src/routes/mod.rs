//! HTTP route handlers.

pub mod health;
pub mod home_alarm;
pub mod home_alarm_device;
pub mod live;
