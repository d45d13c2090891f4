//! Billing handlers.
//!
//! ## Commands
//! - Processing billing provider webhooks
//! - Replaying failed billing events

mod handle_billing_webhook;

pub use handle_billing_webhook::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, HandleBillingWebhookResult,
    ReprocessSummary,
};
