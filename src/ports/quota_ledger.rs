//! QuotaLedger port - the authoritative per-user usage counter.
//!
//! Every mutation is a single-row atomic statement. The ledger only counts;
//! blocking at the limit happens in the access check.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::usage::PeriodRollover;

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Adds one counted session and returns the new count.
    ///
    /// Increments `free_consumed` on the free tier and `consumed_this_period`
    /// otherwise, decided inside the same atomic statement.
    ///
    /// # Errors
    ///
    /// `SubscriptionNotFound` if the user has no row.
    async fn increment(&self, user_id: &UserId) -> Result<u32, DomainError>;

    /// Zeroes `consumed_this_period` and moves the window forward.
    ///
    /// Compare-and-set on `rollover.expected_period_end`: returns false, doing
    /// nothing, if another caller already rolled the period.
    async fn reset_period(
        &self,
        user_id: &UserId,
        rollover: &PeriodRollover,
        now: Timestamp,
    ) -> Result<bool, DomainError>;
}
