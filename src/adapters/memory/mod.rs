//! In-memory adapters for development and tests.
//!
//! Not suitable for multi-server deployments: state lives in the process.

mod billing_event_store;
mod clock;
mod subscription_store;
mod usage_session_repository;
mod user_directory;

pub use billing_event_store::InMemoryBillingEventStore;
pub use clock::FixedClock;
pub use subscription_store::InMemorySubscriptionStore;
pub use usage_session_repository::InMemoryUsageSessionRepository;
pub use user_directory::InMemoryUserDirectory;
