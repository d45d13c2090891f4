//! UserDirectory port - resolves billing customers to local users.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks up a user by email, case-insensitively.
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<UserId>, DomainError>;
}
