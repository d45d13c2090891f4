//! HTTP adapters - REST API implementations.

pub mod quota;

use std::time::Duration;

use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use quota::{quota_router, QuotaAppState};

/// Builds the served application: routes, state, request tracing and a
/// per-request timeout (408 when exceeded).
pub fn build_app(state: QuotaAppState, request_timeout: Duration) -> Router {
    quota_router()
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
