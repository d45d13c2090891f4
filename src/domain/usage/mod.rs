//! Usage module - timed sessions and quota access.

mod access;
mod errors;
mod session;

pub use access::{rollover_due, AccessSnapshot, PeriodRollover};
pub use errors::UsageError;
pub use session::{SessionKind, UsageSession};
