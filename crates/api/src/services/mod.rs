//! Transport adapters.

pub mod mqtt;
