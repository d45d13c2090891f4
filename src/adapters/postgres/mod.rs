//! PostgreSQL adapters - Database implementations for the store ports.
//!
//! - `PostgresSubscriptionStore` - Subscription rows, the quota ledger and period resets
//! - `PostgresBillingEventStore` - Webhook idempotency log
//! - `PostgresUsageSessionRepository` - Session rows and the counted gate
//! - `PostgresUserDirectory` - Email lookup against the `users` table
//!
//! Every statement runs under the configured statement timeout. Connection
//! loss, pool exhaustion, serialization failures and deadlocks surface as
//! transient `DatabaseError`s so callers may retry them.

mod billing_event_store;
mod subscription_store;
mod usage_session_repository;
mod user_directory;

pub use billing_event_store::PostgresBillingEventStore;
pub use subscription_store::PostgresSubscriptionStore;
pub use usage_session_repository::PostgresUsageSessionRepository;
pub use user_directory::PostgresUserDirectory;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

/// Runs a store call under `limit`.
pub(crate) async fn timed<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(DomainError::timeout(operation))
        }
    }
}

/// Maps a sqlx error, keeping transient failures retryable.
pub(crate) fn db_error(operation: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |err| {
        let transient = match &err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
            // serialization_failure, deadlock_detected
            sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001" | "40P01")),
            _ => false,
        };
        let code = if transient {
            ErrorCode::DatabaseError
        } else {
            ErrorCode::InternalError
        };
        DomainError::new(code, format!("{} failed: {}", operation, err))
    }
}

pub(crate) fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

pub(crate) fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub(crate) fn to_datetime(value: Option<Timestamp>) -> Option<DateTime<Utc>> {
    value.map(|ts| *ts.as_datetime())
}

pub(crate) fn corrupt_row(field: &'static str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::InternalError, format!("Invalid stored {}: {}", field, err))
}
