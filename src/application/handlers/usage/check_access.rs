//! CheckAccessHandler - Query handler for a user's remaining quota.
//!
//! Safe to call redundantly. Side effects are limited to creating the free
//! default row and rolling a lapsed metered period forward, both idempotent.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{QuotaPolicy, Subscription};
use crate::domain::usage::{rollover_due, AccessSnapshot, UsageError};
use crate::ports::{Clock, QuotaLedger, SubscriptionRepository};

/// Query for a user's current access.
#[derive(Debug, Clone)]
pub struct CheckAccessQuery {
    pub user_id: UserId,
}

/// Handler for access checks.
pub struct CheckAccessHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn QuotaLedger>,
    clock: Arc<dyn Clock>,
    policy: Arc<QuotaPolicy>,
}

impl CheckAccessHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        ledger: Arc<dyn QuotaLedger>,
        clock: Arc<dyn Clock>,
        policy: Arc<QuotaPolicy>,
    ) -> Self {
        Self {
            subscriptions,
            ledger,
            clock,
            policy,
        }
    }

    pub async fn handle(&self, query: CheckAccessQuery) -> Result<AccessSnapshot, UsageError> {
        let now = self.clock.now();
        let subscription = self.current(&query.user_id, now).await?;
        Ok(AccessSnapshot::evaluate(&subscription, now))
    }

    /// Loads the subscription with any due period reset already applied.
    pub(crate) async fn current(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<Subscription, UsageError> {
        let subscription = match self.subscriptions.find_by_user_id(user_id).await? {
            Some(subscription) => subscription,
            None => {
                let default = Subscription::free_default(user_id.clone(), &self.policy, now);
                self.subscriptions.ensure_exists(&default).await?
            }
        };

        let Some(rollover) = rollover_due(&subscription, &self.policy, now) else {
            return Ok(subscription);
        };

        if self.ledger.reset_period(user_id, &rollover, now).await? {
            tracing::info!(
                user_id = %user_id,
                tier = %subscription.tier,
                consumed = subscription.consumed_this_period,
                new_period_end = %rollover.new_end,
                "Billing period rolled over"
            );
            let mut subscription = subscription;
            rollover.apply_to(&mut subscription, now);
            Ok(subscription)
        } else {
            // Another caller reset it first.
            self.subscriptions
                .find_by_user_id(user_id)
                .await?
                .ok_or_else(|| {
                    UsageError::Store(DomainError::new(
                        ErrorCode::SubscriptionNotFound,
                        format!("Subscription for {} disappeared during reset", user_id),
                    ))
                })
        }
    }
}
