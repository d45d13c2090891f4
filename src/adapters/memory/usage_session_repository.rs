//! In-memory usage session rows.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, SessionToken, Timestamp};
use crate::domain::usage::UsageSession;
use crate::ports::{InsertResult, UsageSessionRepository};

#[derive(Debug, Default, Clone)]
pub struct InMemoryUsageSessionRepository {
    sessions: Arc<RwLock<HashMap<SessionToken, UsageSession>>>,
}

impl InMemoryUsageSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageSessionRepository for InMemoryUsageSessionRepository {
    async fn insert(&self, session: &UsageSession) -> Result<InsertResult, DomainError> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&session.session_token) {
            return Ok(InsertResult::AlreadyExists(existing.clone()));
        }
        sessions.insert(session.session_token.clone(), session.clone());
        Ok(InsertResult::Inserted)
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<UsageSession>, DomainError> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn try_mark_counted(
        &self,
        token: &SessionToken,
        at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, DomainError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(token) {
            Some(session) if !session.counted_toward_usage && !session.is_ended() => {
                session.counted_toward_usage = true;
                session.counted_at = Some(at);
                session.duration_seconds = Some(duration_seconds);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn end(
        &self,
        token: &SessionToken,
        ended_at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, DomainError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(token) {
            Some(session) if !session.is_ended() => {
                session.ended_at = Some(ended_at);
                session.duration_seconds = Some(duration_seconds);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::domain::usage::SessionKind;

    fn session() -> UsageSession {
        UsageSession::start(
            SessionToken::new("tok-1").unwrap(),
            UserId::new("user-1").unwrap(),
            SessionKind::new("osce").unwrap(),
            Timestamp::from_unix_secs(1_000_000),
        )
    }

    #[tokio::test]
    async fn duplicate_insert_returns_existing() {
        let repo = InMemoryUsageSessionRepository::new();
        let s = session();

        assert_eq!(repo.insert(&s).await.unwrap(), InsertResult::Inserted);
        assert_eq!(repo.insert(&s).await.unwrap(), InsertResult::AlreadyExists(s));
    }

    #[tokio::test]
    async fn mark_counted_flips_once() {
        let repo = InMemoryUsageSessionRepository::new();
        let s = session();
        repo.insert(&s).await.unwrap();
        let at = s.started_at.plus_secs(300);

        assert!(repo.try_mark_counted(&s.session_token, at, 300).await.unwrap());
        assert!(!repo.try_mark_counted(&s.session_token, at, 300).await.unwrap());
    }

    #[tokio::test]
    async fn ended_session_cannot_be_counted() {
        let repo = InMemoryUsageSessionRepository::new();
        let s = session();
        repo.insert(&s).await.unwrap();
        let at = s.started_at.plus_secs(100);

        assert!(repo.end(&s.session_token, at, 100).await.unwrap());
        assert!(!repo.end(&s.session_token, at, 100).await.unwrap());
        assert!(!repo.try_mark_counted(&s.session_token, at, 100).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_token_is_a_no_op() {
        let repo = InMemoryUsageSessionRepository::new();
        let token = SessionToken::new("nope").unwrap();
        assert!(!repo.try_mark_counted(&token, Timestamp::now(), 0).await.unwrap());
        assert!(repo.find_by_token(&token).await.unwrap().is_none());
    }
}
