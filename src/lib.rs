//! Quota Engine - subscription entitlements and usage quotas.
//!
//! Ingests billing provider webhooks into per-user subscriptions and meters
//! timed simulation sessions against the tier's allowance.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
