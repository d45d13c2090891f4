//! PostgreSQL implementation of BillingEventStore.
//!
//! The primary key on `event_id` is the dedup mechanism. A conflicting insert
//! locks the existing row and decides, inside the same transaction, whether the
//! caller may re-claim it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use super::{corrupt_row, db_error, timed, to_u32};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{
    is_reclaimable, BillingEventRecord, BillingEventStore, EventOutcome, IngestResult,
    NewBillingEvent, ProcessingStatus,
};

const COLUMNS: &str = "event_id, event_type, raw_payload, received_at, claimed_at, processed_at, \
     processing_status, error_detail, user_id, subscription_id, delivery_count";

#[derive(Clone)]
pub struct PostgresBillingEventStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresBillingEventStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BillingEventRow {
    event_id: String,
    event_type: String,
    raw_payload: String,
    received_at: DateTime<Utc>,
    claimed_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    processing_status: String,
    error_detail: Option<String>,
    user_id: Option<String>,
    subscription_id: Option<String>,
    delivery_count: i32,
}

impl TryFrom<BillingEventRow> for BillingEventRecord {
    type Error = DomainError;

    fn try_from(row: BillingEventRow) -> Result<Self, Self::Error> {
        Ok(BillingEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            raw_payload: row.raw_payload,
            received_at: Timestamp::from_datetime(row.received_at),
            claimed_at: Timestamp::from_datetime(row.claimed_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            processing_status: row
                .processing_status
                .parse::<ProcessingStatus>()
                .map_err(|e| corrupt_row("processing_status", e))?,
            error_detail: row.error_detail,
            user_id: row
                .user_id
                .map(UserId::new)
                .transpose()
                .map_err(|e| corrupt_row("user_id", e))?,
            subscription_id: row.subscription_id,
            delivery_count: to_u32(row.delivery_count),
        })
    }
}

#[async_trait]
impl BillingEventStore for PostgresBillingEventStore {
    async fn ingest(
        &self,
        event: NewBillingEvent,
        stale_before: Timestamp,
    ) -> Result<IngestResult, DomainError> {
        timed(self.statement_timeout, "billing_event.ingest", async {
            let map_err = db_error("billing_event.ingest");
            let mut tx = self.pool.begin().await.map_err(&map_err)?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO billing_events (
                    event_id, event_type, raw_payload, received_at, claimed_at,
                    processing_status, delivery_count
                ) VALUES ($1, $2, $3, $4, $4, 'processing', 1)
                ON CONFLICT (event_id) DO NOTHING
                "#,
            )
            .bind(&event.event_id)
            .bind(&event.event_type)
            .bind(&event.raw_payload)
            .bind(event.received_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(&map_err)?
            .rows_affected()
                == 1;

            if inserted {
                tx.commit().await.map_err(&map_err)?;
                return Ok(IngestResult::Accepted);
            }

            let row: BillingEventRow = sqlx::query_as(&format!(
                "SELECT {} FROM billing_events WHERE event_id = $1 FOR UPDATE",
                COLUMNS
            ))
            .bind(&event.event_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(&map_err)?;
            let mut existing = BillingEventRecord::try_from(row)?;
            existing.delivery_count = existing.delivery_count.saturating_add(1);

            let result = if is_reclaimable(&existing, stale_before) {
                sqlx::query(
                    r#"
                    UPDATE billing_events SET
                        processing_status = 'processing',
                        claimed_at = $2,
                        error_detail = NULL,
                        delivery_count = delivery_count + 1
                    WHERE event_id = $1
                    "#,
                )
                .bind(&event.event_id)
                .bind(event.received_at.as_datetime())
                .execute(&mut *tx)
                .await
                .map_err(&map_err)?;
                IngestResult::Accepted
            } else {
                sqlx::query(
                    "UPDATE billing_events SET delivery_count = delivery_count + 1 WHERE event_id = $1",
                )
                .bind(&event.event_id)
                .execute(&mut *tx)
                .await
                .map_err(&map_err)?;
                IngestResult::Duplicate(existing)
            };

            tx.commit().await.map_err(&map_err)?;
            Ok(result)
        })
        .await
    }

    async fn record_outcome(&self, event_id: &str, outcome: EventOutcome) -> Result<(), DomainError> {
        timed(self.statement_timeout, "billing_event.record_outcome", async {
            let result = sqlx::query(
                r#"
                UPDATE billing_events SET
                    processing_status = $2,
                    error_detail = $3,
                    user_id = COALESCE($4, user_id),
                    subscription_id = COALESCE($5, subscription_id),
                    processed_at = $6
                WHERE event_id = $1
                "#,
            )
            .bind(event_id)
            .bind(outcome.status.as_str())
            .bind(&outcome.error_detail)
            .bind(outcome.user_id.as_ref().map(UserId::as_str))
            .bind(&outcome.subscription_id)
            .bind(outcome.processed_at.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("billing_event.record_outcome"))?;

            if result.rows_affected() == 0 {
                return Err(DomainError::new(
                    ErrorCode::BillingEventNotFound,
                    format!("Billing event {} not found", event_id),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn find(&self, event_id: &str) -> Result<Option<BillingEventRecord>, DomainError> {
        timed(self.statement_timeout, "billing_event.find", async {
            let row: Option<BillingEventRow> = sqlx::query_as(&format!(
                "SELECT {} FROM billing_events WHERE event_id = $1",
                COLUMNS
            ))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("billing_event.find"))?;

            row.map(BillingEventRecord::try_from).transpose()
        })
        .await
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<BillingEventRecord>, DomainError> {
        timed(self.statement_timeout, "billing_event.list_failed", async {
            let rows: Vec<BillingEventRow> = sqlx::query_as(&format!(
                r#"
                SELECT {} FROM billing_events
                WHERE processing_status = 'failed'
                ORDER BY received_at ASC
                LIMIT $1
                "#,
                COLUMNS
            ))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("billing_event.list_failed"))?;

            rows.into_iter().map(BillingEventRecord::try_from).collect()
        })
        .await
    }
}
