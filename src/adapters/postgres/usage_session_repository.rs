//! PostgreSQL implementation of UsageSessionRepository.
//!
//! The counted gate is a conditional `UPDATE ... WHERE counted_toward_usage = FALSE`;
//! exactly one of any number of concurrent callers sees a row affected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use super::{corrupt_row, db_error, timed};
use crate::domain::foundation::{DomainError, SessionToken, Timestamp, UserId};
use crate::domain::usage::{SessionKind, UsageSession};
use crate::ports::{InsertResult, UsageSessionRepository};

#[derive(Clone)]
pub struct PostgresUsageSessionRepository {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresUsageSessionRepository {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    async fn fetch(&self, token: &SessionToken) -> Result<Option<UsageSession>, DomainError> {
        let row: Option<UsageSessionRow> = sqlx::query_as(
            r#"
            SELECT session_token, user_id, session_kind, started_at, ended_at,
                   counted_toward_usage, counted_at, duration_seconds
            FROM usage_sessions
            WHERE session_token = $1
            "#,
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("usage_session.find"))?;

        row.map(UsageSession::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UsageSessionRow {
    session_token: String,
    user_id: String,
    session_kind: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    counted_toward_usage: bool,
    counted_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
}

impl TryFrom<UsageSessionRow> for UsageSession {
    type Error = DomainError;

    fn try_from(row: UsageSessionRow) -> Result<Self, Self::Error> {
        Ok(UsageSession {
            session_token: SessionToken::new(row.session_token)
                .map_err(|e| corrupt_row("session_token", e))?,
            user_id: UserId::new(row.user_id).map_err(|e| corrupt_row("user_id", e))?,
            session_kind: SessionKind::new(row.session_kind)
                .map_err(|e| corrupt_row("session_kind", e))?,
            started_at: Timestamp::from_datetime(row.started_at),
            ended_at: row.ended_at.map(Timestamp::from_datetime),
            counted_toward_usage: row.counted_toward_usage,
            counted_at: row.counted_at.map(Timestamp::from_datetime),
            duration_seconds: row.duration_seconds,
        })
    }
}

#[async_trait]
impl UsageSessionRepository for PostgresUsageSessionRepository {
    async fn insert(&self, session: &UsageSession) -> Result<InsertResult, DomainError> {
        timed(self.statement_timeout, "usage_session.insert", async {
            let result = sqlx::query(
                r#"
                INSERT INTO usage_sessions (
                    session_token, user_id, session_kind, started_at, counted_toward_usage
                ) VALUES ($1, $2, $3, $4, FALSE)
                ON CONFLICT (session_token) DO NOTHING
                "#,
            )
            .bind(session.session_token.as_str())
            .bind(session.user_id.as_str())
            .bind(session.session_kind.as_str())
            .bind(session.started_at.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("usage_session.insert"))?;

            if result.rows_affected() == 1 {
                return Ok(InsertResult::Inserted);
            }
            match self.fetch(&session.session_token).await? {
                Some(existing) => Ok(InsertResult::AlreadyExists(existing)),
                // Conflicting row vanished; rows are never deleted, so treat as a store fault.
                None => Err(DomainError::database(format!(
                    "session {} conflicted but could not be read",
                    session.session_token
                ))),
            }
        })
        .await
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<UsageSession>, DomainError> {
        timed(self.statement_timeout, "usage_session.find", self.fetch(token)).await
    }

    async fn try_mark_counted(
        &self,
        token: &SessionToken,
        at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, DomainError> {
        timed(self.statement_timeout, "usage_session.mark_counted", async {
            let result = sqlx::query(
                r#"
                UPDATE usage_sessions SET
                    counted_toward_usage = TRUE,
                    counted_at = $2,
                    duration_seconds = $3
                WHERE session_token = $1
                  AND counted_toward_usage = FALSE
                  AND ended_at IS NULL
                "#,
            )
            .bind(token.as_str())
            .bind(at.as_datetime())
            .bind(duration_seconds)
            .execute(&self.pool)
            .await
            .map_err(db_error("usage_session.mark_counted"))?;

            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn end(
        &self,
        token: &SessionToken,
        ended_at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, DomainError> {
        timed(self.statement_timeout, "usage_session.end", async {
            let result = sqlx::query(
                r#"
                UPDATE usage_sessions SET
                    ended_at = $2,
                    duration_seconds = $3
                WHERE session_token = $1
                  AND ended_at IS NULL
                "#,
            )
            .bind(token.as_str())
            .bind(ended_at.as_datetime())
            .bind(duration_seconds)
            .execute(&self.pool)
            .await
            .map_err(db_error("usage_session.end"))?;

            Ok(result.rows_affected() == 1)
        })
        .await
    }
}
