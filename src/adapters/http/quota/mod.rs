//! HTTP adapter for the quota engine.
//!
//! Exposes the billing webhook and the session API:
//! - `POST /webhooks/billing`
//! - `GET /access`
//! - `POST /sessions`, `GET /sessions/:token`
//! - `POST /sessions/:token/counted`, `POST /sessions/:token/end`

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{
    AuthenticatedUser, AuthenticationRequired, BillingApiError, QuotaAppState, UsageApiError,
    SIGNATURE_HEADER, USER_ID_HEADER,
};
pub use routes::{quota_router, usage_routes, webhook_routes};
