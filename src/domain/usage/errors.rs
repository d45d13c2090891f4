//! Usage session errors.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | QuotaExhausted | 402 |
//! | TooEarly | 425 |
//! | SessionNotFound | 404 |
//! | SessionEnded | 409 |
//! | Validation | 400 |
//! | Store (transient) | 503 |
//! | Store | 500 |

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};
use crate::domain::subscription::Tier;

/// Errors surfaced by the session API.
#[derive(Debug, Clone, Error)]
pub enum UsageError {
    /// No quota left; the client shows an upgrade prompt.
    #[error("Quota exhausted: {consumed}/{limit} used on {tier}")]
    QuotaExhausted { tier: Tier, limit: u32, consumed: u32 },

    /// The unlimited tier is not active.
    #[error("Subscription is {0}; unlimited access requires an active subscription")]
    SubscriptionInactive(String),

    /// `markCounted` arrived before the threshold. Nothing was changed.
    #[error("Too early: {elapsed_secs}s elapsed, {required_secs}s required")]
    TooEarly { elapsed_secs: i64, required_secs: i64 },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The session ended without being counted; it can no longer change.
    #[error("Session already ended: {0}")]
    SessionEnded(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(DomainError),
}

impl UsageError {
    pub fn code(&self) -> &'static str {
        match self {
            UsageError::QuotaExhausted { .. } => "QUOTA_EXHAUSTED",
            UsageError::SubscriptionInactive(_) => "SUBSCRIPTION_INACTIVE",
            UsageError::TooEarly { .. } => "TOO_EARLY",
            UsageError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            UsageError::SessionEnded(_) => "SESSION_ENDED",
            UsageError::Validation(_) => "VALIDATION_FAILED",
            UsageError::Store(err) if err.is_transient() => "STORE_UNAVAILABLE",
            UsageError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            UsageError::QuotaExhausted { .. } | UsageError::SubscriptionInactive(_) => {
                StatusCode::PAYMENT_REQUIRED
            }
            UsageError::TooEarly { .. } => too_early(),
            UsageError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            UsageError::SessionEnded(_) => StatusCode::CONFLICT,
            UsageError::Validation(_) => StatusCode::BAD_REQUEST,
            UsageError::Store(err) if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            UsageError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 425 has no named constant in `http`.
fn too_early() -> StatusCode {
    StatusCode::from_u16(425).unwrap_or(StatusCode::CONFLICT)
}

impl From<DomainError> for UsageError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => UsageError::Validation(err.message),
            ErrorCode::SessionNotFound => UsageError::SessionNotFound(err.message),
            _ => UsageError::Store(err),
        }
    }
}

impl From<ValidationError> for UsageError {
    fn from(err: ValidationError) -> Self {
        UsageError::Validation(err.to_string())
    }
}
