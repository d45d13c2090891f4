//! In-memory billing event log.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{
    is_reclaimable, BillingEventRecord, BillingEventStore, EventOutcome, IngestResult,
    NewBillingEvent, ProcessingStatus,
};

/// In-memory implementation of `BillingEventStore`.
///
/// The map key plays the role of the unique constraint on `event_id`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBillingEventStore {
    records: Arc<RwLock<HashMap<String, BillingEventRecord>>>,
}

impl InMemoryBillingEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records, for assertions.
    pub async fn records(&self) -> Vec<BillingEventRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl BillingEventStore for InMemoryBillingEventStore {
    async fn ingest(
        &self,
        event: NewBillingEvent,
        stale_before: Timestamp,
    ) -> Result<IngestResult, DomainError> {
        let mut records = self.records.write().await;

        match records.get_mut(&event.event_id) {
            None => {
                records.insert(event.event_id.clone(), event.into_record());
                Ok(IngestResult::Accepted)
            }
            Some(existing) => {
                existing.delivery_count = existing.delivery_count.saturating_add(1);
                if is_reclaimable(existing, stale_before) {
                    existing.processing_status = ProcessingStatus::Processing;
                    existing.claimed_at = event.received_at;
                    existing.error_detail = None;
                    Ok(IngestResult::Accepted)
                } else {
                    Ok(IngestResult::Duplicate(existing.clone()))
                }
            }
        }
    }

    async fn record_outcome(&self, event_id: &str, outcome: EventOutcome) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(event_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::BillingEventNotFound,
                format!("Billing event {} not found", event_id),
            )
        })?;

        record.processing_status = outcome.status;
        record.error_detail = outcome.error_detail;
        record.processed_at = Some(outcome.processed_at);
        if outcome.user_id.is_some() {
            record.user_id = outcome.user_id;
        }
        if outcome.subscription_id.is_some() {
            record.subscription_id = outcome.subscription_id;
        }
        Ok(())
    }

    async fn find(&self, event_id: &str) -> Result<Option<BillingEventRecord>, DomainError> {
        Ok(self.records.read().await.get(event_id).cloned())
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<BillingEventRecord>, DomainError> {
        let records = self.records.read().await;
        let mut failed: Vec<_> = records
            .values()
            .filter(|r| r.processing_status == ProcessingStatus::Failed)
            .cloned()
            .collect();
        failed.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        failed.truncate(limit as usize);
        Ok(failed)
    }
}
