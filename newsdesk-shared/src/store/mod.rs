//! Identity store boundary
//!
//! The auth core never talks to the database directly. It needs a handful of
//! lookups and two writes, and [`UserStore`] is exactly that surface.
//!
//! # Implementations
//!
//! - [`PgUserStore`]: PostgreSQL via sqlx, used by the server
//! - [`MemoryUserStore`]: in-process map, used by tests and local demos
//!
//! # Example
//!
//! ```
//! use newsdesk_shared::models::user::{NewUser, Role};
//! use newsdesk_shared::store::{MemoryUserStore, UserStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryUserStore::new();
//! let user = store.create(NewUser {
//!     username: "jdoe".to_string(),
//!     email: "jdoe@example.com".to_string(),
//!     full_name: "Jane Doe".to_string(),
//!     role: Role::User,
//!     password_hash: "$argon2id$...".to_string(),
//! }).await?;
//!
//! let found = store.find_by_username_or_email("jdoe@example.com").await?;
//! assert_eq!(found.map(|u| u.id), Some(user.id));
//! # Ok(())
//! # }
//! ```

mod memory;
mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;

use crate::models::user::{NewUser, User};

/// Error type for identity store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Username or email already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Narrow identity lookup/update capability
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds a user whose username or email equals `login`
    ///
    /// An exact username match wins over an email match.
    async fn find_by_username_or_email(&self, login: &str) -> Result<Option<User>, StoreError>;

    /// Finds a user by ID
    async fn find_by_id(&self, id: u64) -> Result<Option<User>, StoreError>;

    /// Creates a user
    ///
    /// # Errors
    ///
    /// `StoreError::Conflict` if the username or email is taken
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Replaces a user's password hash
    ///
    /// Returns `false` if no such user exists.
    async fn update_password_hash(&self, id: u64, password_hash: String)
        -> Result<bool, StoreError>;

    /// Checks the backend is reachable
    async fn health_check(&self) -> Result<(), StoreError>;
}
