//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;
pub mod retry;

pub use handlers::{
    // Billing handlers
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, HandleBillingWebhookResult,
    ReprocessSummary,
    // Usage handlers
    CheckAccessHandler, CheckAccessQuery, EndSessionCommand, EndSessionHandler, EndSessionResult,
    GetSessionHandler, GetSessionQuery, MarkCountedCommand, MarkCountedHandler, MarkCountedResult,
    StartSessionCommand, StartSessionHandler, StartSessionResult,
};
pub use retry::RetryPolicy;
