//! In-memory subscription store.
//!
//! Implements both `SubscriptionRepository` and `QuotaLedger` over one map, the
//! same way the Postgres adapter keeps counters on the subscription row. Every
//! operation runs under a single write lock, which gives it the same atomicity
//! as the conditional SQL statements.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::Subscription;
use crate::domain::usage::PeriodRollover;
use crate::ports::{QuotaLedger, SubscriptionRepository};

/// In-memory subscription rows for development and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemorySubscriptionStore {
    rows: Arc<RwLock<HashMap<UserId, Subscription>>>,
    /// Number of upcoming `save_transition` calls that fail as transient errors.
    injected_failures: Arc<AtomicU32>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces a row.
    pub async fn put(&self, subscription: Subscription) {
        self.rows
            .write()
            .await
            .insert(subscription.user_id.clone(), subscription);
    }

    /// Makes the next `count` transition writes fail with a database error.
    pub fn fail_next_writes(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionStore {
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.rows.read().await.get(user_id).cloned())
    }

    async fn ensure_exists(&self, default: &Subscription) -> Result<Subscription, DomainError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(default.user_id.clone())
            .or_insert_with(|| default.clone());
        Ok(row.clone())
    }

    async fn save_transition(
        &self,
        subscription: &Subscription,
        reset_consumed: bool,
        expected_period_end: Option<Timestamp>,
    ) -> Result<Subscription, DomainError> {
        if self.take_injected_failure() {
            return Err(DomainError::database("injected write failure"));
        }

        let mut rows = self.rows.write().await;
        let stored = match rows.get(&subscription.user_id) {
            Some(existing) if existing.period_end != expected_period_end => {
                return Err(stale_window(&subscription.user_id));
            }
            Some(existing) => {
                let mut next = subscription.clone();
                next.free_consumed = existing.free_consumed;
                next.created_at = existing.created_at;
                if reset_consumed {
                    next.consumed_this_period = 0;
                } else {
                    next.consumed_this_period = existing.consumed_this_period;
                    next.last_reset_at = existing.last_reset_at;
                }
                next
            }
            None => {
                let mut next = subscription.clone();
                if reset_consumed {
                    next.consumed_this_period = 0;
                }
                next
            }
        };
        rows.insert(stored.user_id.clone(), stored.clone());
        Ok(stored)
    }
}

fn stale_window(user_id: &UserId) -> DomainError {
    DomainError::new(
        ErrorCode::Conflict,
        format!("Billing window for {} changed since it was read", user_id),
    )
}

#[async_trait]
impl QuotaLedger for InMemorySubscriptionStore {
    async fn increment(&self, user_id: &UserId) -> Result<u32, DomainError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(user_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("No subscription for user {}", user_id),
            )
        })?;

        let counter = if row.is_free() {
            &mut row.free_consumed
        } else {
            &mut row.consumed_this_period
        };
        *counter = counter.saturating_add(1);
        Ok(*counter)
    }

    async fn reset_period(
        &self,
        user_id: &UserId,
        rollover: &PeriodRollover,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(user_id) {
            Some(row) if row.period_end == rollover.expected_period_end => {
                rollover.apply_to(row, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
