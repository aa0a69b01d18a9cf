use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{StoreError, UserStore};
use crate::models::user::{NewUser, User};

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<u64, User>,
    last_id: u64,
}

/// In-memory identity store
///
/// Mirrors the PostgreSQL store's uniqueness rules. IDs start at 1.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username_or_email(&self, login: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        let by_username = inner.users.values().find(|u| u.username == login);
        let found = by_username.or_else(|| {
            inner
                .users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(login))
        });

        Ok(found.cloned())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(taken) = inner
            .users
            .values()
            .find(|u| u.username == user.username || u.email.eq_ignore_ascii_case(&user.email))
        {
            let field = if taken.username == user.username {
                "username"
            } else {
                "email"
            };
            return Err(StoreError::Conflict(format!("{} already taken", field)));
        }

        inner.last_id += 1;
        let now = Utc::now();
        let created = User {
            id: inner.last_id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn update_password_hash(
        &self,
        id: u64,
        password_hash: String,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;

        match inner.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            full_name: String::new(),
            role: Role::User,
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = MemoryUserStore::new();

        let first = store.create(new_user("a", "a@example.com")).await.unwrap();
        let second = store.create(new_user("b", "b@example.com")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_username_or_email_conflicts() {
        let store = MemoryUserStore::new();
        store.create(new_user("a", "a@example.com")).await.unwrap();

        let err = store.create(new_user("a", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref msg) if msg.contains("username")));

        let err = store.create(new_user("other", "a@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref msg) if msg.contains("email")));
    }

    #[tokio::test]
    async fn test_username_match_wins_over_email() {
        let store = MemoryUserStore::new();
        // Someone whose username looks like another user's email
        let by_email = store.create(new_user("first", "shared@example.com")).await.unwrap();
        let by_name = store.create(new_user("shared@example.com", "second@example.com")).await.unwrap();

        let found = store
            .find_by_username_or_email("shared@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, by_name.id);
        assert_ne!(found.id, by_email.id);
    }

    #[tokio::test]
    async fn test_email_is_case_insensitive() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("a", "a@example.com")).await.unwrap();

        let found = store
            .find_by_username_or_email("A@Example.COM")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);

        let err = store.create(new_user("b", "A@EXAMPLE.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref msg) if msg.contains("email")));
    }

    #[tokio::test]
    async fn test_update_password_hash() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("a", "a@example.com")).await.unwrap();

        assert!(store.update_password_hash(user.id, "new".to_string()).await.unwrap());
        assert!(!store.update_password_hash(999, "new".to_string()).await.unwrap());

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new");
    }
}
