//! The gated increment shared by mark-counted and the end-session fallback.

use std::sync::Arc;

use crate::domain::foundation::Timestamp;
use crate::domain::usage::{UsageError, UsageSession};
use crate::ports::{QuotaLedger, UsageSessionRepository};

pub(crate) struct SessionCounter {
    sessions: Arc<dyn UsageSessionRepository>,
    ledger: Arc<dyn QuotaLedger>,
}

impl SessionCounter {
    pub(crate) fn new(
        sessions: Arc<dyn UsageSessionRepository>,
        ledger: Arc<dyn QuotaLedger>,
    ) -> Self {
        Self { sessions, ledger }
    }

    /// Flips the counted flag and, only if this call flipped it, increments the ledger.
    ///
    /// Returns the new consumed count, or `None` when another caller already
    /// counted the session (or it ended in between).
    pub(crate) async fn count_once(
        &self,
        session: &UsageSession,
        now: Timestamp,
    ) -> Result<Option<u32>, UsageError> {
        let elapsed = session.elapsed_secs(now);
        let flipped = self
            .sessions
            .try_mark_counted(&session.session_token, now, elapsed)
            .await?;
        if !flipped {
            return Ok(None);
        }

        match self.ledger.increment(&session.user_id).await {
            Ok(consumed) => {
                tracing::info!(
                    session_token = %session.session_token,
                    user_id = %session.user_id,
                    kind = %session.session_kind,
                    elapsed_secs = elapsed,
                    consumed,
                    "Session counted toward usage"
                );
                Ok(Some(consumed))
            }
            Err(err) => {
                // The flag is set, so a retry will not increment; needs reconciliation.
                tracing::error!(
                    session_token = %session.session_token,
                    user_id = %session.user_id,
                    error = %err,
                    "Session flagged counted but ledger increment failed"
                );
                Err(UsageError::Store(err))
            }
        }
    }
}
