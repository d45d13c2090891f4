//! GetSessionHandler - Query handler for reading a session row.

use std::sync::Arc;

use crate::domain::foundation::{SessionToken, UserId};
use crate::domain::usage::{UsageError, UsageSession};
use crate::ports::UsageSessionRepository;

/// Query for one of the caller's sessions.
#[derive(Debug, Clone)]
pub struct GetSessionQuery {
    pub user_id: UserId,
    pub session_token: String,
}

pub struct GetSessionHandler {
    sessions: Arc<dyn UsageSessionRepository>,
}

impl GetSessionHandler {
    pub fn new(sessions: Arc<dyn UsageSessionRepository>) -> Self {
        Self { sessions }
    }

    /// Sessions of other users are reported as not found.
    pub async fn handle(&self, query: GetSessionQuery) -> Result<UsageSession, UsageError> {
        let token = SessionToken::new(query.session_token)?;
        self.sessions
            .find_by_token(&token)
            .await?
            .filter(|session| session.is_owned_by(&query.user_id))
            .ok_or_else(|| UsageError::SessionNotFound(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryUsageSessionRepository;
    use crate::domain::foundation::Timestamp;
    use crate::domain::usage::SessionKind;

    #[tokio::test]
    async fn returns_only_own_sessions() {
        let sessions = InMemoryUsageSessionRepository::new();
        let owner = UserId::new("user-1").unwrap();
        sessions
            .insert(&UsageSession::start(
                SessionToken::new("tok-1").unwrap(),
                owner.clone(),
                SessionKind::new("osce").unwrap(),
                Timestamp::now(),
            ))
            .await
            .unwrap();
        let handler = GetSessionHandler::new(Arc::new(sessions));

        let found = handler
            .handle(GetSessionQuery {
                user_id: owner,
                session_token: "tok-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(found.session_token.as_str(), "tok-1");

        let err = handler
            .handle(GetSessionQuery {
                user_id: UserId::new("user-2").unwrap(),
                session_token: "tok-1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UsageError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn malformed_token_is_a_validation_error() {
        let handler = GetSessionHandler::new(Arc::new(InMemoryUsageSessionRepository::new()));

        let err = handler
            .handle(GetSessionQuery {
                user_id: UserId::new("user-1").unwrap(),
                session_token: "has spaces".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, UsageError::Validation(_)));
    }
}
