//! BillingEventStore port - append-only log of inbound billing webhooks.
//!
//! The store is both the idempotency mechanism and the audit trail. A unique
//! constraint on `event_id` decides which delivery wins:
//!
//! - first delivery inserts a `processing` row and proceeds
//! - a replay of a `processed` or `ignored` event is a duplicate
//! - a replay of a `failed` event, or of a `processing` claim older than the
//!   stale window (a crashed worker), is re-claimed and processed again
//!
//! Rows are never deleted.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{DomainError, Timestamp, UserId, ValidationError};

/// Processing state of a stored billing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Claimed by a worker, outcome not yet recorded.
    Processing,
    Processed,
    Failed,
    Ignored,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Ignored => "ignored",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ProcessingStatus::Processing),
            "processed" => Ok(ProcessingStatus::Processed),
            "failed" => Ok(ProcessingStatus::Failed),
            "ignored" => Ok(ProcessingStatus::Ignored),
            other => Err(ValidationError::invalid_format(
                "processing_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// A billing event as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEventRecord {
    pub event_id: String,
    pub event_type: String,
    /// Exact request body, kept for audit and manual replay.
    pub raw_payload: String,
    pub received_at: Timestamp,
    /// Last time a worker claimed this event.
    pub claimed_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub processing_status: ProcessingStatus,
    pub error_detail: Option<String>,
    pub user_id: Option<UserId>,
    pub subscription_id: Option<String>,
    /// Number of times the provider delivered this event.
    pub delivery_count: u32,
}

/// A freshly received event to ingest.
#[derive(Debug, Clone)]
pub struct NewBillingEvent {
    pub event_id: String,
    pub event_type: String,
    pub raw_payload: String,
    pub received_at: Timestamp,
}

impl NewBillingEvent {
    /// The row written on first delivery.
    pub fn into_record(self) -> BillingEventRecord {
        BillingEventRecord {
            event_id: self.event_id,
            event_type: self.event_type,
            raw_payload: self.raw_payload,
            received_at: self.received_at,
            claimed_at: self.received_at,
            processed_at: None,
            processing_status: ProcessingStatus::Processing,
            error_detail: None,
            user_id: None,
            subscription_id: None,
            delivery_count: 1,
        }
    }
}

/// Result of ingesting an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
    /// This caller owns processing of the event.
    Accepted,
    /// Already handled or in flight elsewhere; nothing to do.
    Duplicate(BillingEventRecord),
}

/// Final outcome of processing a claimed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOutcome {
    pub status: ProcessingStatus,
    pub error_detail: Option<String>,
    pub user_id: Option<UserId>,
    pub subscription_id: Option<String>,
    pub processed_at: Timestamp,
}

impl EventOutcome {
    pub fn processed(user_id: UserId, subscription_id: Option<String>, at: Timestamp) -> Self {
        Self {
            status: ProcessingStatus::Processed,
            error_detail: None,
            user_id: Some(user_id),
            subscription_id,
            processed_at: at,
        }
    }

    pub fn ignored(reason: impl Into<String>, user_id: Option<UserId>, at: Timestamp) -> Self {
        Self {
            status: ProcessingStatus::Ignored,
            error_detail: Some(reason.into()),
            user_id,
            subscription_id: None,
            processed_at: at,
        }
    }

    pub fn failed(error: impl Into<String>, user_id: Option<UserId>, at: Timestamp) -> Self {
        Self {
            status: ProcessingStatus::Failed,
            error_detail: Some(error.into()),
            user_id,
            subscription_id: None,
            processed_at: at,
        }
    }
}

/// Port for the billing event log.
#[async_trait]
pub trait BillingEventStore: Send + Sync {
    /// Inserts or re-claims the event.
    ///
    /// `stale_before`: a `processing` row claimed before this instant is re-claimable.
    /// Every call, including duplicates, increments `delivery_count`.
    async fn ingest(
        &self,
        event: NewBillingEvent,
        stale_before: Timestamp,
    ) -> Result<IngestResult, DomainError>;

    /// Records the outcome of processing a claimed event.
    async fn record_outcome(&self, event_id: &str, outcome: EventOutcome) -> Result<(), DomainError>;

    async fn find(&self, event_id: &str) -> Result<Option<BillingEventRecord>, DomainError>;

    /// Failed events, oldest first, for manual replay.
    async fn list_failed(&self, limit: u32) -> Result<Vec<BillingEventRecord>, DomainError>;
}

/// Decides whether a conflicting insert may take over an existing row.
pub fn is_reclaimable(existing: &BillingEventRecord, stale_before: Timestamp) -> bool {
    match existing.processing_status {
        ProcessingStatus::Failed => true,
        ProcessingStatus::Processing => existing.claimed_at.is_before(&stale_before),
        ProcessingStatus::Processed | ProcessingStatus::Ignored => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: ProcessingStatus, claimed_at: Timestamp) -> BillingEventRecord {
        let mut record = NewBillingEvent {
            event_id: "wh_1".into(),
            event_type: "subscription_created".into(),
            raw_payload: "{}".into(),
            received_at: claimed_at,
        }
        .into_record();
        record.processing_status = status;
        record
    }

    #[test]
    fn new_record_starts_processing_with_one_delivery() {
        let r = record(ProcessingStatus::Processing, Timestamp::now());
        assert_eq!(r.delivery_count, 1);
        assert!(r.processed_at.is_none());
    }

    #[test]
    fn failed_events_are_reclaimable() {
        let now = Timestamp::now();
        assert!(is_reclaimable(&record(ProcessingStatus::Failed, now), now.minus_secs(600)));
    }

    #[test]
    fn finished_events_are_not_reclaimable() {
        let now = Timestamp::now();
        for status in [ProcessingStatus::Processed, ProcessingStatus::Ignored] {
            assert!(!is_reclaimable(&record(status, now.minus_days(1)), now));
        }
    }

    #[test]
    fn only_stale_processing_claims_are_reclaimable() {
        let now = Timestamp::now();
        let stale_before = now.minus_secs(600);

        assert!(!is_reclaimable(&record(ProcessingStatus::Processing, now.minus_secs(60)), stale_before));
        assert!(is_reclaimable(&record(ProcessingStatus::Processing, now.minus_secs(601)), stale_before));
    }

    #[test]
    fn status_names_round_trip() {
        for status in [
            ProcessingStatus::Processing,
            ProcessingStatus::Processed,
            ProcessingStatus::Failed,
            ProcessingStatus::Ignored,
        ] {
            assert_eq!(status.as_str().parse::<ProcessingStatus>().unwrap(), status);
        }
    }

    #[test]
    fn outcome_constructors_set_status() {
        let now = Timestamp::now();
        let user = UserId::new("u1").unwrap();
        assert_eq!(
            EventOutcome::processed(user.clone(), Some("sub_1".into()), now).status,
            ProcessingStatus::Processed
        );
        assert_eq!(EventOutcome::ignored("dup", None, now).status, ProcessingStatus::Ignored);
        assert_eq!(
            EventOutcome::failed("user not found", None, now).error_detail.as_deref(),
            Some("user not found")
        );
    }
}
