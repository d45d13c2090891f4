//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;
pub mod usage;

pub use billing::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, HandleBillingWebhookResult,
    ReprocessSummary,
};
pub use usage::{
    CheckAccessHandler, CheckAccessQuery, EndSessionCommand, EndSessionHandler, EndSessionResult,
    GetSessionHandler, GetSessionQuery, MarkCountedCommand, MarkCountedHandler, MarkCountedResult,
    StartSessionCommand, StartSessionHandler, StartSessionResult,
};
