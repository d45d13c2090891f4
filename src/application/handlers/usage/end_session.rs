//! EndSessionHandler - Command handler for closing a session.
//!
//! Ending is also how a session is cancelled: an uncounted session ended
//! before the threshold never touches the ledger. A session that reached the
//! threshold but was never marked counted is counted here as a fallback.

use std::sync::Arc;

use crate::domain::foundation::{SessionToken, UserId};
use crate::domain::subscription::QuotaPolicy;
use crate::domain::usage::{UsageError, UsageSession};
use crate::ports::{Clock, QuotaLedger, UsageSessionRepository};

use super::counting::SessionCounter;
use super::CheckAccessHandler;

/// Command to end a session.
#[derive(Debug, Clone)]
pub struct EndSessionCommand {
    pub user_id: UserId,
    pub session_token: String,
}

/// Result of ending a session.
#[derive(Debug, Clone)]
pub struct EndSessionResult {
    pub session: UsageSession,
    /// True when this call performed the fallback count.
    pub counted_on_end: bool,
    /// True when the session had already ended; nothing changed.
    pub already_ended: bool,
}

/// Handler for ending sessions.
pub struct EndSessionHandler {
    access: Arc<CheckAccessHandler>,
    sessions: Arc<dyn UsageSessionRepository>,
    counter: SessionCounter,
    clock: Arc<dyn Clock>,
    policy: Arc<QuotaPolicy>,
}

impl EndSessionHandler {
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

    pub async fn handle(&self, cmd: EndSessionCommand) -> Result<EndSessionResult, UsageError> {
        let token = SessionToken::new(cmd.session_token)?;
        let session = self.load_owned(&token, &cmd.user_id).await?;

        if session.is_ended() {
            return Ok(EndSessionResult {
                session,
                counted_on_end: false,
                already_ended: true,
            });
        }

        let now = self.clock.now();
        let mut counted_on_end = false;
        if !session.counted_toward_usage && session.threshold_reached(now, &self.policy) {
            self.access.current(&cmd.user_id, now).await?;
            counted_on_end = self.counter.count_once(&session, now).await?.is_some();
        }

        let duration = session.elapsed_secs(now);
        let ended = self.sessions.end(&token, now, duration).await?;
        let session = self.load_owned(&token, &cmd.user_id).await?;

        tracing::debug!(
            session_token = %token,
            duration_secs = duration,
            counted = session.counted_toward_usage,
            counted_on_end,
            "Session ended"
        );

        Ok(EndSessionResult {
            session,
            counted_on_end,
            already_ended: !ended,
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{FixedClock, InMemorySubscriptionStore, InMemoryUsageSessionRepository};
    use crate::domain::foundation::Timestamp;
    use crate::domain::subscription::Subscription;
    use crate::domain::usage::SessionKind;
    use crate::ports::SubscriptionRepository;

    struct Fixture {
        handler: EndSessionHandler,
        store: InMemorySubscriptionStore,
        sessions: InMemoryUsageSessionRepository,
        clock: FixedClock,
    }

    fn start() -> Timestamp {
        Timestamp::parse_rfc3339("2026-01-01T00:00:00Z").unwrap()
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    async fn fixture() -> Fixture {
        let store = InMemorySubscriptionStore::new();
        let sessions = InMemoryUsageSessionRepository::new();
        let clock = FixedClock::at(start());
        let policy = Arc::new(QuotaPolicy::default());

        store.put(Subscription::free_default(user(), &policy, start())).await;
        sessions
            .insert(&UsageSession::start(
                SessionToken::new("tok-1").unwrap(),
                user(),
                SessionKind::new("osce").unwrap(),
                start(),
            ))
            .await
            .unwrap();

        let access = Arc::new(CheckAccessHandler::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            policy.clone(),
        ));
        let handler = EndSessionHandler::new(
            access,
            Arc::new(sessions.clone()),
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            policy,
        );

        Fixture {
            handler,
            store,
            sessions,
            clock,
        }
    }

    fn cmd() -> EndSessionCommand {
        EndSessionCommand {
            user_id: user(),
            session_token: "tok-1".into(),
        }
    }

    async fn free_consumed(store: &InMemorySubscriptionStore) -> u32 {
        store.find_by_user_id(&user()).await.unwrap().unwrap().free_consumed
    }

    #[tokio::test]
    async fn early_end_is_a_cancel_without_counting() {
        let f = fixture().await;
        f.clock.advance_secs(120);

        let result = f.handler.handle(cmd()).await.unwrap();

        assert!(!result.counted_on_end);
        assert!(!result.session.counted_toward_usage);
        assert_eq!(result.session.duration_seconds, Some(120));
        assert_eq!(result.session.ended_at, Some(start().plus_secs(120)));
        assert_eq!(free_consumed(&f.store).await, 0);
    }

    #[tokio::test]
    async fn end_after_threshold_counts_as_fallback() {
        let f = fixture().await;
        f.clock.advance_secs(600);

        let result = f.handler.handle(cmd()).await.unwrap();

        assert!(result.counted_on_end);
        assert!(result.session.counted_toward_usage);
        assert_eq!(result.session.duration_seconds, Some(600));
        assert_eq!(free_consumed(&f.store).await, 1);
    }

    #[tokio::test]
    async fn end_of_counted_session_does_not_count_again() {
        let f = fixture().await;
        let token = SessionToken::new("tok-1").unwrap();
        f.sessions.try_mark_counted(&token, start().plus_secs(300), 300).await.unwrap();
        QuotaLedger::increment(&f.store, &user()).await.unwrap();
        f.clock.advance_secs(900);

        let result = f.handler.handle(cmd()).await.unwrap();

        assert!(!result.counted_on_end);
        assert_eq!(free_consumed(&f.store).await, 1);
    }

    #[tokio::test]
    async fn second_end_is_a_no_op() {
        let f = fixture().await;
        f.clock.advance_secs(60);
        f.handler.handle(cmd()).await.unwrap();
        f.clock.advance_secs(600);

        let again = f.handler.handle(cmd()).await.unwrap();

        assert!(again.already_ended);
        assert_eq!(again.session.duration_seconds, Some(60));
        assert_eq!(free_consumed(&f.store).await, 0);
    }
}
