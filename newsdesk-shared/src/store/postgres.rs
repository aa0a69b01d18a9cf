use async_trait::async_trait;
use sqlx::PgPool;

use super::{StoreError, UserStore};
use crate::db::pool;
use crate::models::user::{NewUser, User};

/// PostgreSQL-backed identity store
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username_or_email(&self, login: &str) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_username_or_email(&self.pool, login).await?)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let username = user.username.clone();

        User::create(&self.pool, user).await.map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("user {} already exists", username))
            }
            other => StoreError::Database(other),
        })
    }

    async fn update_password_hash(
        &self,
        id: u64,
        password_hash: String,
    ) -> Result<bool, StoreError> {
        Ok(User::update_password_hash(&self.pool, id, &password_hash).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(pool::health_check(&self.pool).await?)
    }
}
