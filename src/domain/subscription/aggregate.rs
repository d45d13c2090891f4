//! Subscription aggregate.
//!
//! One row per user. Never deleted, only transitioned. The quota ledger counters
//! live on the same row so that resets and increments are single-row operations.
//!
//! # Design Decisions
//!
//! - **Lazy creation**: a user with no row is treated as the free-tier default
//! - **Two counters**: `free_consumed` is the lifetime free allowance and never
//!   resets; `consumed_this_period` meters paid tiers

use serde::{Deserialize, Serialize};

use super::{QuotaPolicy, SubscriptionStatus, Tier};
use crate::domain::foundation::{Timestamp, UserId};

/// Subscription aggregate with its embedded quota counters.
///
/// # Invariants
///
/// - `quota_limit` always equals the policy ceiling for `tier`
/// - `consumed_this_period` only decreases through a period reset or tier change
/// - `free_consumed` never decreases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: UserId,
    pub tier: Tier,
    pub status: SubscriptionStatus,

    /// Ceiling for the current tier. `None` means unlimited.
    pub quota_limit: Option<u32>,

    /// Counted sessions in the current paid billing period.
    pub consumed_this_period: u32,

    /// Counted sessions on the free tier, lifetime.
    pub free_consumed: u32,

    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,

    /// When `consumed_this_period` was last zeroed.
    pub last_reset_at: Timestamp,

    pub external_subscription_id: Option<String>,
    pub external_variant_id: Option<String>,
    pub customer_email: Option<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// The implicit free-tier record every user starts with.
    pub fn free_default(user_id: UserId, policy: &QuotaPolicy, now: Timestamp) -> Self {
        Self {
            user_id,
            tier: Tier::None,
            status: SubscriptionStatus::Active,
            quota_limit: policy.limit_for(Tier::None),
            consumed_this_period: 0,
            free_consumed: 0,
            period_start: None,
            period_end: None,
            last_reset_at: now,
            external_subscription_id: None,
            external_variant_id: None,
            customer_email: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True while on the free tier.
    pub fn is_free(&self) -> bool {
        self.tier == Tier::None
    }

    /// The counter the current tier is metered against.
    pub fn consumed(&self) -> u32 {
        if self.is_free() {
            self.free_consumed
        } else {
            self.consumed_this_period
        }
    }

    /// Remaining sessions, `None` when unlimited.
    pub fn remaining(&self) -> Option<u32> {
        self.quota_limit
            .map(|limit| limit.saturating_sub(self.consumed()))
    }

    /// True once a paid subscription no longer grants sessions: it expired, or
    /// it was cancelled and the paid-through `period_end` is behind `now`.
    pub fn access_ended(&self, now: Timestamp) -> bool {
        if !self.tier.is_paid() {
            return false;
        }
        match self.status {
            SubscriptionStatus::Expired => true,
            SubscriptionStatus::Cancelled => self.period_end.map_or(false, |end| now.is_after(&end)),
            _ => false,
        }
    }
}
