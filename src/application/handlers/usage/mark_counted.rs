//! MarkCountedHandler - Command handler for counting a session toward quota.
//!
//! Idempotent: any number of calls, concurrent or repeated, increment the
//! ledger at most once per session.

use std::sync::Arc;

use crate::domain::foundation::{SessionToken, UserId};
use crate::domain::subscription::QuotaPolicy;
use crate::domain::usage::{UsageError, UsageSession};
use crate::ports::{Clock, QuotaLedger, UsageSessionRepository};

use super::counting::SessionCounter;
use super::CheckAccessHandler;

/// Command to count a session.
#[derive(Debug, Clone)]
pub struct MarkCountedCommand {
    pub user_id: UserId,
    pub session_token: String,
}

/// Result of a mark-counted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkCountedResult {
    /// This call counted the session.
    Counted { consumed: u32 },
    /// The session had already been counted; nothing changed.
    AlreadyCounted,
}

/// Handler for counting sessions.
pub struct MarkCountedHandler {
    access: Arc<CheckAccessHandler>,
    sessions: Arc<dyn UsageSessionRepository>,
    counter: SessionCounter,
    clock: Arc<dyn Clock>,
    policy: Arc<QuotaPolicy>,
}

impl MarkCountedHandler {
    pub fn new(
        access: Arc<CheckAccessHandler>,
        sessions: Arc<dyn UsageSessionRepository>,
        ledger: Arc<dyn QuotaLedger>,
        clock: Arc<dyn Clock>,
        policy: Arc<QuotaPolicy>,
    ) -> Self {
        Self {
            access,
            counter: SessionCounter::new(sessions.clone(), ledger),
            sessions,
            clock,
            policy,
        }
    }

    pub async fn handle(&self, cmd: MarkCountedCommand) -> Result<MarkCountedResult, UsageError> {
        let token = SessionToken::new(cmd.session_token)?;
        let session = self.load_owned(&token, &cmd.user_id).await?;

        if session.counted_toward_usage {
            return Ok(MarkCountedResult::AlreadyCounted);
        }
        if session.is_ended() {
            return Err(UsageError::SessionEnded(token.to_string()));
        }

        let now = self.clock.now();
        let elapsed = session.elapsed_secs(now);
        if !session.threshold_reached(now, &self.policy) {
            tracing::debug!(
                session_token = %token,
                elapsed_secs = elapsed,
                "Mark-counted called before threshold"
            );
            return Err(UsageError::TooEarly {
                elapsed_secs: elapsed,
                required_secs: self.policy.effective_threshold_secs(),
            });
        }

        // Roll a lapsed period forward first so the count lands in the new period.
        self.access.current(&cmd.user_id, now).await?;

        match self.counter.count_once(&session, now).await? {
            Some(consumed) => Ok(MarkCountedResult::Counted { consumed }),
            None => {
                let latest = self.load_owned(&token, &cmd.user_id).await?;
                if !latest.counted_toward_usage && latest.is_ended() {
                    Err(UsageError::SessionEnded(token.to_string()))
                } else {
                    Ok(MarkCountedResult::AlreadyCounted)
                }
            }
        }
    }

    async fn load_owned(
        &self,
        token: &SessionToken,
        user_id: &UserId,
    ) -> Result<UsageSession, UsageError> {
        self.sessions
            .find_by_token(token)
            .await?
            .filter(|session| session.is_owned_by(user_id))
            .ok_or_else(|| UsageError::SessionNotFound(token.to_string()))
    }
}
