//! SubscriptionRepository port - persistence of the per-user subscription row.
//!
//! The row also carries the quota counters. Writes from the state machine must
//! not clobber concurrent ledger increments, so counters are only ever zeroed
//! (when a transition resets them) and never overwritten with a stale read.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::subscription::Subscription;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError>;

    /// Inserts `default` unless a row exists, then returns the stored row.
    async fn ensure_exists(&self, default: &Subscription) -> Result<Subscription, DomainError>;

    /// Upserts the subscription fields after a billing transition.
    ///
    /// When `reset_consumed` is true, `consumed_this_period` is zeroed and
    /// `last_reset_at` taken from `subscription`. Otherwise both counters keep
    /// their stored values. `free_consumed` is never written after insert.
    ///
    /// The update applies only while the stored `period_end` still equals
    /// `expected_period_end`, the value the transition was computed from. A
    /// mismatch (a period rollover landed in between) fails with
    /// `ErrorCode::Conflict` and leaves the row untouched.
    async fn save_transition(
        &self,
        subscription: &Subscription,
        reset_consumed: bool,
        expected_period_end: Option<Timestamp>,
    ) -> Result<Subscription, DomainError>;
}
