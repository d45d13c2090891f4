//! Settable clock for deterministic tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::domain::foundation::Timestamp;
use crate::ports::Clock;

/// A clock that only moves when told to. Second precision.
#[derive(Debug, Clone)]
pub struct FixedClock {
    unix_secs: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn at(now: Timestamp) -> Self {
        Self {
            unix_secs: Arc::new(AtomicI64::new(now.as_unix_secs())),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.unix_secs.store(now.as_unix_secs(), Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.unix_secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: i64) {
        self.advance_secs(days * 86_400);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_secs(self.unix_secs.load(Ordering::SeqCst))
    }
}
