//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Store Ports
//!
//! - `BillingEventStore` - Webhook idempotency and audit log
//! - `SubscriptionRepository` - Per-user subscription rows
//! - `QuotaLedger` - Atomic usage counter and period resets
//! - `UsageSessionRepository` - Timed session rows and the counted gate
//!
//! ## Collaborator Ports
//!
//! - `UserDirectory` - Customer email to user lookup
//! - `Clock` - Current time

mod billing_event_store;
mod clock;
mod quota_ledger;
mod subscription_repository;
mod usage_session_repository;
mod user_directory;

pub use billing_event_store::{
    is_reclaimable, BillingEventRecord, BillingEventStore, EventOutcome, IngestResult,
    NewBillingEvent, ProcessingStatus,
};
pub use clock::{Clock, SystemClock};
pub use quota_ledger::QuotaLedger;
pub use subscription_repository::SubscriptionRepository;
pub use usage_session_repository::{InsertResult, UsageSessionRepository};
pub use user_directory::UserDirectory;
