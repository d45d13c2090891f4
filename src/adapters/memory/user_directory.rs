//! In-memory user directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, UserId};
use crate::ports::UserDirectory;

/// Email to user map, keyed by lowercased email.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, UserId>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, email: &str, user_id: UserId) {
        self.users
            .write()
            .await
            .insert(email.trim().to_lowercase(), user_id);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<UserId>, DomainError> {
        Ok(self
            .users
            .read()
            .await
            .get(&email.trim().to_lowercase())
            .cloned())
    }
}
