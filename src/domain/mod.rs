//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `billing` - Billing webhook verification and parsing
//! - `subscription` - Tiers, subscription lifecycle and the quota policy
//! - `usage` - Timed usage sessions, access evaluation and period rollover

pub mod billing;
pub mod foundation;
pub mod subscription;
pub mod usage;
