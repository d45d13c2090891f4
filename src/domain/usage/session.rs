//! Usage session entity.
//!
//! A session is one timed simulation attempt: `started -> counted -> ended`, or
//! `started -> ended` when abandoned before the counting threshold.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{SessionToken, Timestamp, UserId, ValidationError};
use crate::domain::subscription::QuotaPolicy;

const MAX_KIND_LEN: usize = 64;

/// Exam type a session simulates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKind(String);

impl SessionKind {
    pub fn new(kind: impl Into<String>) -> Result<Self, ValidationError> {
        let kind = kind.into();
        let trimmed = kind.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("session_kind"));
        }
        if trimmed.len() > MAX_KIND_LEN {
            return Err(ValidationError::invalid_format(
                "session_kind",
                format!("must be at most {} characters", MAX_KIND_LEN),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A usage session row.
///
/// # Invariants
///
/// - `counted_toward_usage` goes false -> true at most once
/// - nothing changes after `ended_at` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSession {
    pub session_token: SessionToken,
    pub user_id: UserId,
    pub session_kind: SessionKind,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub counted_toward_usage: bool,
    pub counted_at: Option<Timestamp>,
    /// Recomputed when the session is counted and when it ends.
    pub duration_seconds: Option<i64>,
}

impl UsageSession {
    /// A freshly started, uncounted session.
    pub fn start(
        session_token: SessionToken,
        user_id: UserId,
        session_kind: SessionKind,
        now: Timestamp,
    ) -> Self {
        Self {
            session_token,
            user_id,
            session_kind,
            started_at: now,
            ended_at: None,
            counted_toward_usage: false,
            counted_at: None,
            duration_seconds: None,
        }
    }

    /// Whole seconds since start, floored, never negative.
    pub fn elapsed_secs(&self, at: Timestamp) -> i64 {
        at.secs_since(&self.started_at).max(0)
    }

    /// True once the session has run long enough to count.
    pub fn threshold_reached(&self, at: Timestamp, policy: &QuotaPolicy) -> bool {
        self.elapsed_secs(at) >= policy.effective_threshold_secs()
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}
