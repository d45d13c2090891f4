//! Adapters - implementations of the ports and the inbound HTTP surface.
//!
//! - `http` - axum routes for the webhook and session API
//! - `memory` - in-process stores for development and tests
//! - `postgres` - sqlx-backed stores

pub mod http;
pub mod memory;
pub mod postgres;
