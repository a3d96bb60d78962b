use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::repo_types::User;

/// Row-oriented credential store. Emails are compared case-insensitively.
///
/// `exists_by_email` followed by `append` is not atomic; two concurrent
/// registrations of one address may both succeed.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn exists_by_email(&self, email: &str) -> anyhow::Result<bool> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    async fn append(&self, user: User) -> anyhow::Result<()>;
}

/// Process-local store for tests and `USER_STORE=memory`.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn append(&self, mut user: User) -> anyhow::Result<()> {
        user.email = user.email.to_lowercase();
        self.rows.write().await.push(user);
        Ok(())
    }
}
