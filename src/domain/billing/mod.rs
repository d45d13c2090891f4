//! Billing module - inbound provider webhooks.
//!
//! Authenticity checks and payload parsing. Applying a parsed event to a
//! subscription lives in `domain::subscription`.

mod errors;
mod event;
mod verifier;

pub use errors::WebhookError;
pub use event::{BillingAttributes, BillingEvent, BillingEventType};
pub use verifier::WebhookVerifier;

#[cfg(test)]
pub use verifier::compute_test_signature;
