//! UsageSessionRepository port - usage session rows.
//!
//! The counted flag is the gate in front of the quota ledger: only the caller
//! whose conditional update flips it may increment.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SessionToken, Timestamp};
use crate::domain::usage::UsageSession;

/// Result of inserting a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    /// The token is taken; the stored row is returned.
    AlreadyExists(UsageSession),
}

#[async_trait]
pub trait UsageSessionRepository: Send + Sync {
    async fn insert(&self, session: &UsageSession) -> Result<InsertResult, DomainError>;

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<UsageSession>, DomainError>;

    /// Sets `counted_toward_usage = true` where it is false and the session is
    /// still open. Returns true if this call flipped it.
    async fn try_mark_counted(
        &self,
        token: &SessionToken,
        at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, DomainError>;

    /// Sets `ended_at` where it is unset. Returns true if this call ended it.
    async fn end(
        &self,
        token: &SessionToken,
        ended_at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, DomainError>;
}
