//! PostgreSQL implementation of SubscriptionRepository and QuotaLedger.
//!
//! Counters live on the subscription row. The ledger increment and the period
//! reset are single conditional statements, so concurrent callers serialize on
//! the row lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use super::{corrupt_row, db_error, timed, to_datetime, to_i32, to_u32};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionStatus, Tier};
use crate::domain::usage::PeriodRollover;
use crate::ports::{QuotaLedger, SubscriptionRepository};

const COLUMNS: &str = "user_id, tier, status, quota_limit, consumed_this_period, free_consumed, \
     period_start, period_end, last_reset_at, external_subscription_id, external_variant_id, \
     customer_email, created_at, updated_at";

/// PostgreSQL implementation of the subscription and ledger ports.
#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    async fn fetch(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("SELECT {} FROM subscriptions WHERE user_id = $1", COLUMNS))
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("subscription.find"))?;

        row.map(Subscription::try_from).transpose()
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    user_id: String,
    tier: String,
    status: String,
    quota_limit: Option<i32>,
    consumed_this_period: i32,
    free_consumed: i32,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    last_reset_at: DateTime<Utc>,
    external_subscription_id: Option<String>,
    external_variant_id: Option<String>,
    customer_email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            user_id: UserId::new(row.user_id).map_err(|e| corrupt_row("user_id", e))?,
            tier: row.tier.parse::<Tier>().map_err(|e| corrupt_row("tier", e))?,
            status: row
                .status
                .parse::<SubscriptionStatus>()
                .map_err(|e| corrupt_row("status", e))?,
            quota_limit: row.quota_limit.map(to_u32),
            consumed_this_period: to_u32(row.consumed_this_period),
            free_consumed: to_u32(row.free_consumed),
            period_start: row.period_start.map(Timestamp::from_datetime),
            period_end: row.period_end.map(Timestamp::from_datetime),
            last_reset_at: Timestamp::from_datetime(row.last_reset_at),
            external_subscription_id: row.external_subscription_id,
            external_variant_id: row.external_variant_id,
            customer_email: row.customer_email,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionStore {
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        timed(self.statement_timeout, "subscription.find", self.fetch(user_id)).await
    }

    async fn ensure_exists(&self, default: &Subscription) -> Result<Subscription, DomainError> {
        timed(self.statement_timeout, "subscription.ensure_exists", async {
            sqlx::query(
                r#"
                INSERT INTO subscriptions (
                    user_id, tier, status, quota_limit, consumed_this_period, free_consumed,
                    last_reset_at, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, 0, 0, $5, $5, $5)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(default.user_id.as_str())
            .bind(default.tier.as_str())
            .bind(default.status.as_str())
            .bind(default.quota_limit.map(to_i32))
            .bind(default.created_at.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("subscription.ensure_exists"))?;

            self.fetch(&default.user_id).await?.ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("Subscription for {} missing after insert", default.user_id),
                )
            })
        })
        .await
    }

    async fn save_transition(
        &self,
        subscription: &Subscription,
        reset_consumed: bool,
        expected_period_end: Option<Timestamp>,
    ) -> Result<Subscription, DomainError> {
        let consumed = if reset_consumed {
            0
        } else {
            to_i32(subscription.consumed_this_period)
        };

        timed(self.statement_timeout, "subscription.save_transition", async {
            let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
                r#"
                INSERT INTO subscriptions (
                    user_id, tier, status, quota_limit, consumed_this_period, free_consumed,
                    period_start, period_end, last_reset_at, external_subscription_id,
                    external_variant_id, customer_email, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ON CONFLICT (user_id) DO UPDATE SET
                    tier = EXCLUDED.tier,
                    status = EXCLUDED.status,
                    quota_limit = EXCLUDED.quota_limit,
                    consumed_this_period = CASE WHEN $15 THEN 0
                        ELSE subscriptions.consumed_this_period END,
                    period_start = EXCLUDED.period_start,
                    period_end = EXCLUDED.period_end,
                    last_reset_at = CASE WHEN $15 THEN EXCLUDED.last_reset_at
                        ELSE subscriptions.last_reset_at END,
                    external_subscription_id = EXCLUDED.external_subscription_id,
                    external_variant_id = EXCLUDED.external_variant_id,
                    customer_email = EXCLUDED.customer_email,
                    updated_at = EXCLUDED.updated_at
                WHERE subscriptions.period_end IS NOT DISTINCT FROM $16
                RETURNING {}
                "#,
                COLUMNS
            ))
            .bind(subscription.user_id.as_str())
            .bind(subscription.tier.as_str())
            .bind(subscription.status.as_str())
            .bind(subscription.quota_limit.map(to_i32))
            .bind(consumed)
            .bind(to_i32(subscription.free_consumed))
            .bind(to_datetime(subscription.period_start))
            .bind(to_datetime(subscription.period_end))
            .bind(subscription.last_reset_at.as_datetime())
            .bind(&subscription.external_subscription_id)
            .bind(&subscription.external_variant_id)
            .bind(&subscription.customer_email)
            .bind(subscription.created_at.as_datetime())
            .bind(subscription.updated_at.as_datetime())
            .bind(reset_consumed)
            .bind(to_datetime(expected_period_end))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("subscription.save_transition"))?;

            match row {
                Some(row) => Subscription::try_from(row),
                None => Err(DomainError::new(
                    ErrorCode::Conflict,
                    format!(
                        "Billing window for {} changed since it was read",
                        subscription.user_id
                    ),
                )),
            }
        })
        .await
    }
}

#[async_trait]
impl QuotaLedger for PostgresSubscriptionStore {
    async fn increment(&self, user_id: &UserId) -> Result<u32, DomainError> {
        timed(self.statement_timeout, "quota.increment", async {
            let consumed: Option<i32> = sqlx::query_scalar(
                r#"
                UPDATE subscriptions SET
                    free_consumed = CASE WHEN tier = 'none' THEN free_consumed + 1
                        ELSE free_consumed END,
                    consumed_this_period = CASE WHEN tier = 'none' THEN consumed_this_period
                        ELSE consumed_this_period + 1 END,
                    updated_at = NOW()
                WHERE user_id = $1
                RETURNING CASE WHEN tier = 'none' THEN free_consumed ELSE consumed_this_period END
                "#,
            )
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("quota.increment"))?;

            consumed.map(to_u32).ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("No subscription for user {}", user_id),
                )
            })
        })
        .await
    }

    async fn reset_period(
        &self,
        user_id: &UserId,
        rollover: &PeriodRollover,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        timed(self.statement_timeout, "quota.reset_period", async {
            let result = sqlx::query(
                r#"
                UPDATE subscriptions SET
                    consumed_this_period = 0,
                    period_start = $3,
                    period_end = $4,
                    last_reset_at = $5,
                    updated_at = $5
                WHERE user_id = $1
                  AND period_end IS NOT DISTINCT FROM $2
                "#,
            )
            .bind(user_id.as_str())
            .bind(to_datetime(rollover.expected_period_end))
            .bind(rollover.new_start.as_datetime())
            .bind(rollover.new_end.as_datetime())
            .bind(now.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("quota.reset_period"))?;

            Ok(result.rows_affected() == 1)
        })
        .await
    }
}
