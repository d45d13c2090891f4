//! Subscription module - tiers, lifecycle and the quota policy.

mod aggregate;
mod errors;
mod policy;
mod status;
mod tier;
mod transition;

pub use aggregate::Subscription;
pub use errors::SubscriptionError;
pub use policy::{parse_plan_tiers, QuotaPolicy, TierResolution};
pub use status::SubscriptionStatus;
pub use tier::Tier;
pub use transition::{apply_event, Transition};
