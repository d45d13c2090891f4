//! StartSessionHandler - Command handler for opening a timed usage session.

use std::sync::Arc;

use crate::domain::foundation::{SessionToken, UserId};
use crate::domain::usage::{AccessSnapshot, SessionKind, UsageError, UsageSession};
use crate::ports::{Clock, InsertResult, UsageSessionRepository};

use super::CheckAccessHandler;

/// Command to start a session.
#[derive(Debug, Clone)]
pub struct StartSessionCommand {
    pub user_id: UserId,
    pub session_kind: String,
    /// Client-chosen token for safe retries; generated when absent.
    pub session_token: Option<String>,
}

/// Result of starting a session.
#[derive(Debug, Clone)]
pub struct StartSessionResult {
    pub session: UsageSession,
    /// False when the token already existed and the stored session was returned.
    pub created: bool,
    /// Access at the time of the pre-check; `None` for a repeated start.
    pub access: Option<AccessSnapshot>,
}

/// Handler for starting sessions.
///
/// Starting does not consume quota. Only a session counted later does.
pub struct StartSessionHandler {
    access: Arc<CheckAccessHandler>,
    sessions: Arc<dyn UsageSessionRepository>,
    clock: Arc<dyn Clock>,
}

impl StartSessionHandler {
    pub fn new(
        access: Arc<CheckAccessHandler>,
        sessions: Arc<dyn UsageSessionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            access,
            sessions,
            clock,
        }
    }

    pub async fn handle(&self, cmd: StartSessionCommand) -> Result<StartSessionResult, UsageError> {
        let kind = SessionKind::new(cmd.session_kind)?;
        let token = match cmd.session_token {
            Some(raw) => {
                let token = SessionToken::new(raw)?;
                if let Some(existing) = self.sessions.find_by_token(&token).await? {
                    return existing_start(existing, &cmd.user_id);
                }
                token
            }
            None => SessionToken::generate(),
        };

        let now = self.clock.now();
        let subscription = self.access.current(&cmd.user_id, now).await?;
        let access = AccessSnapshot::evaluate(&subscription, now);
        if !access.can_start {
            tracing::info!(
                user_id = %cmd.user_id,
                tier = %access.tier,
                status = %access.status,
                consumed = access.consumed,
                "Session start refused"
            );
            return Err(refusal(&access));
        }

        let session = UsageSession::start(token, cmd.user_id, kind, now);
        match self.sessions.insert(&session).await? {
            InsertResult::Inserted => {
                tracing::debug!(
                    session_token = %session.session_token,
                    user_id = %session.user_id,
                    kind = %session.session_kind,
                    "Session started"
                );
                Ok(StartSessionResult {
                    session,
                    created: true,
                    access: Some(access),
                })
            }
            InsertResult::AlreadyExists(existing) => existing_start(existing, &session.user_id),
        }
    }
}

fn existing_start(existing: UsageSession, user_id: &UserId) -> Result<StartSessionResult, UsageError> {
    if !existing.is_owned_by(user_id) {
        return Err(UsageError::Validation(format!(
            "session token {} is already in use",
            existing.session_token
        )));
    }
    Ok(StartSessionResult {
        session: existing,
        created: false,
        access: None,
    })
}

fn refusal(access: &AccessSnapshot) -> UsageError {
    match (access.limit, access.remaining) {
        (Some(limit), Some(0)) => UsageError::QuotaExhausted {
            tier: access.tier,
            limit,
            consumed: access.consumed,
        },
        _ => UsageError::SubscriptionInactive(access.status.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{FixedClock, InMemorySubscriptionStore, InMemoryUsageSessionRepository};
    use crate::domain::foundation::Timestamp;
    use crate::domain::subscription::{QuotaPolicy, Subscription, SubscriptionStatus, Tier};

    struct Fixture {
        handler: StartSessionHandler,
        store: InMemorySubscriptionStore,
        sessions: InMemoryUsageSessionRepository,
    }

    fn start() -> Timestamp {
        Timestamp::parse_rfc3339("2026-01-01T00:00:00Z").unwrap()
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn fixture() -> Fixture {
        let store = InMemorySubscriptionStore::new();
        let sessions = InMemoryUsageSessionRepository::new();
        let clock = Arc::new(FixedClock::at(start()));
        let access = Arc::new(CheckAccessHandler::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
            Arc::new(QuotaPolicy::default()),
        ));
        Fixture {
            handler: StartSessionHandler::new(access, Arc::new(sessions.clone()), clock),
            store,
            sessions,
        }
    }

    async fn seed_basic(store: &InMemorySubscriptionStore, consumed: u32) {
        let policy = QuotaPolicy::default();
        let mut sub = Subscription::free_default(user(), &policy, start());
        sub.tier = Tier::Basic;
        sub.quota_limit = Some(30);
        sub.consumed_this_period = consumed;
        sub.period_start = Some(start());
        sub.period_end = Some(start().add_days(30));
        store.put(sub).await;
    }

    fn cmd(token: Option<&str>) -> StartSessionCommand {
        StartSessionCommand {
            user_id: user(),
            session_kind: "osce".into(),
            session_token: token.map(String::from),
        }
    }

    #[tokio::test]
    async fn starts_when_quota_remains() {
        let f = fixture();
        seed_basic(&f.store, 29).await;

        let result = f.handler.handle(cmd(None)).await.unwrap();

        assert!(result.created);
        assert!(!result.session.counted_toward_usage);
        assert_eq!(result.access.unwrap().remaining, Some(1));
        assert!(f
            .sessions
            .find_by_token(&result.session.session_token)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn exhausted_quota_is_refused() {
        let f = fixture();
        seed_basic(&f.store, 30).await;

        let err = f.handler.handle(cmd(None)).await.unwrap_err();

        assert!(matches!(
            err,
            UsageError::QuotaExhausted {
                tier: Tier::Basic,
                limit: 30,
                consumed: 30
            }
        ));
    }

    #[tokio::test]
    async fn inactive_unlimited_is_refused() {
        let f = fixture();
        let mut sub = Subscription::free_default(user(), &QuotaPolicy::default(), start());
        sub.tier = Tier::Unlimited;
        sub.quota_limit = None;
        sub.status = SubscriptionStatus::Cancelled;
        f.store.put(sub).await;

        let err = f.handler.handle(cmd(None)).await.unwrap_err();

        assert!(matches!(err, UsageError::SubscriptionInactive(_)));
    }

    #[tokio::test]
    async fn expired_plan_with_leftover_quota_is_refused() {
        let f = fixture();
        let mut sub = Subscription::free_default(user(), &QuotaPolicy::default(), start());
        sub.tier = Tier::Basic;
        sub.quota_limit = Some(30);
        sub.consumed_this_period = 4;
        sub.status = SubscriptionStatus::Expired;
        f.store.put(sub).await;

        let err = f.handler.handle(cmd(None)).await.unwrap_err();

        assert!(matches!(err, UsageError::SubscriptionInactive(_)));
    }

    #[tokio::test]
    async fn repeated_token_returns_existing_session() {
        let f = fixture();

        let first = f.handler.handle(cmd(Some("client-tok-1"))).await.unwrap();
        let second = f.handler.handle(cmd(Some("client-tok-1"))).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.session, second.session);
    }

    #[tokio::test]
    async fn token_owned_by_another_user_is_rejected() {
        let f = fixture();
        f.handler.handle(cmd(Some("shared-tok"))).await.unwrap();

        let err = f
            .handler
            .handle(StartSessionCommand {
                user_id: UserId::new("user-2").unwrap(),
                session_kind: "osce".into(),
                session_token: Some("shared-tok".into()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, UsageError::Validation(_)));
    }

    #[tokio::test]
    async fn blank_kind_is_a_validation_error() {
        let f = fixture();
        let err = f
            .handler
            .handle(StartSessionCommand {
                user_id: user(),
                session_kind: "  ".into(),
                session_token: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, UsageError::Validation(_)));
    }
}
