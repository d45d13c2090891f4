//! PostgreSQL implementation of UserDirectory.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use super::{corrupt_row, db_error, timed};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::UserDirectory;

/// Looks users up in the `users` table owned by the account backend.
#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<UserId>, DomainError> {
        timed(self.statement_timeout, "users.find_by_email", async {
            let id: Option<String> =
                sqlx::query_scalar("SELECT id FROM users WHERE lower(email) = lower($1) LIMIT 1")
                    .bind(email.trim())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error("users.find_by_email"))?;

            id.map(UserId::new)
                .transpose()
                .map_err(|e| corrupt_row("users.id", e))
        })
        .await
    }
}
