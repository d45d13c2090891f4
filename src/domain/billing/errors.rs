//! Webhook error types for billing webhook handling.
//!
//! Defines all error conditions that can occur during webhook processing,
//! with HTTP status code mapping and retryability semantics.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signing secret is configured, so nothing can be verified.
    #[error("Webhook secret not configured")]
    SecretNotConfigured,

    /// The signature header was absent or empty.
    #[error("Missing signature")]
    MissingSignature,

    /// The signature is not 64 hex characters (after an optional `sha256=` prefix).
    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// The digest did not match.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Failed to parse the webhook payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// No local user matches the event's customer email.
    #[error("User not found for email {0}")]
    UserNotFound(String),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// A transient store failure persisted through every retry.
    #[error("Retries exhausted: {0}")]
    RetriesExhausted(String),
}

impl WebhookError {
    /// Returns true if the provider should redeliver this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::UserNotFound(_)
                | WebhookError::Store(_)
                | WebhookError::RetriesExhausted(_)
        )
    }

    /// Returns true for failures of authenticity checks. These are never retried.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature
                | WebhookError::InvalidSignatureFormat(_)
                | WebhookError::InvalidSignature
        )
    }

    /// Short machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::SecretNotConfigured => "WEBHOOK_NOT_CONFIGURED",
            WebhookError::MissingSignature => "MISSING_SIGNATURE",
            WebhookError::InvalidSignatureFormat(_) | WebhookError::InvalidSignature => {
                "INVALID_SIGNATURE"
            }
            WebhookError::ParseError(_) | WebhookError::MissingField(_) => "INVALID_PAYLOAD",
            WebhookError::UserNotFound(_) => "USER_NOT_FOUND",
            WebhookError::Store(_) => "STORE_ERROR",
            WebhookError::RetriesExhausted(_) => "RETRIES_EXHAUSTED",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    ///
    /// - 4xx: Rejected
    /// - 5xx: Server error, provider redelivers
    ///
    /// Acknowledged outcomes (processed, duplicate, ignored) are not errors.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::ParseError(_)
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            WebhookError::InvalidSignatureFormat(_) | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }

            WebhookError::UserNotFound(_) => StatusCode::NOT_FOUND,

            WebhookError::SecretNotConfigured
            | WebhookError::Store(_)
            | WebhookError::RetriesExhausted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
