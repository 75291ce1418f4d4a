//! Shared utilities for the home alarm backend.
//!
//! This crate provides functionality used across all other crates:
//! - Secret comparison for device credentials
//! - Operator access token validation (RS256 JWT)

pub mod crypto;
pub mod jwt;
