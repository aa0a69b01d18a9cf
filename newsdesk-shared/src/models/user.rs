//! User model and database operations
//!
//! This module provides the User model, the editorial [`Role`] set and the
//! SQL for the `users` table. The auth core only ever creates users and
//! rewrites their password hash; everything else about an account belongs to
//! the content side of the application.
//!
//! # Schema
//!
//! ```sql
//! CREATE TYPE user_role AS ENUM
//!     ('admin', 'editor', 'author', 'contributor', 'user', 'subscriber');
//!
//! CREATE TABLE users (
//!     id BIGSERIAL PRIMARY KEY,
//!     username VARCHAR(50) NOT NULL UNIQUE,
//!     email VARCHAR(255) NOT NULL UNIQUE,
//!     full_name VARCHAR(255) NOT NULL DEFAULT '',
//!     role user_role NOT NULL DEFAULT 'user',
//!     password_hash VARCHAR(255) NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! # Example
//!
//! ```no_run
//! use newsdesk_shared::models::user::{NewUser, Role, User};
//! use newsdesk_shared::db::pool::{create_pool, DatabaseConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool(DatabaseConfig::default()).await?;
//!
//! let user = User::create(&pool, NewUser {
//!     username: "jdoe".to_string(),
//!     email: "jdoe@example.com".to_string(),
//!     full_name: "Jane Doe".to_string(),
//!     role: Role::Author,
//!     password_hash: "$argon2id$...".to_string(),
//! }).await?;
//!
//! // Login accepts either the username or the email
//! let found = User::find_by_username_or_email(&pool, "jdoe@example.com").await?;
//! assert_eq!(found.map(|u| u.id), Some(user.id));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Editorial roles
///
/// Roles are a flat set. Gates list the roles they admit; there is no
/// hierarchy between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Site administration, user management
    Admin,

    /// Reviews and publishes anyone's content
    Editor,

    /// Writes and edits own articles
    Author,

    /// Submits drafts for review
    Contributor,

    /// Registered reader, may comment
    User,

    /// Paying reader
    Subscriber,
}

impl Role {
    /// Every role, in declaration order
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Editor,
        Role::Author,
        Role::Contributor,
        Role::User,
        Role::Subscriber,
    ];

    /// Converts role to its wire/database string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Author => "author",
            Role::Contributor => "contributor",
            Role::User => "user",
            Role::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// User account
///
/// Passwords are stored as Argon2id hashes. The hash is never serialized.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    #[sqlx(try_from = "i64")]
    pub id: u64,

    /// Login name, unique
    pub username: String,

    /// Email address, unique; also accepted as a login name
    pub email: String,

    /// Display name
    pub full_name: String,

    /// Editorial role
    pub role: Role,

    /// Argon2id password hash (PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

/// The part of a user that travels inside a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// User ID
    pub id: u64,

    /// Login name at the time the token was issued
    pub username: String,

    /// Email at the time the token was issued
    pub email: String,

    /// Role at the time the token was issued
    pub role: Role,
}

impl User {
    /// Projects the identity fields carried by session tokens
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Input for creating a new user
///
/// `password_hash` must already be hashed. Plaintext never reaches this type.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub password_hash: String,
}

fn db_id(id: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(id).map_err(|_| sqlx::Error::Protocol(format!("user id {} out of range", id)))
}

impl User {
    /// Creates a new user in the database
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error if the username or email is
    /// already taken
    pub async fn create(pool: &PgPool, data: NewUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, full_name, role, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, email, full_name, role, password_hash, created_at, updated_at
            "#,
        )
        .bind(&data.username)
        .bind(&data.email)
        .bind(&data.full_name)
        .bind(data.role)
        .bind(&data.password_hash)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: u64) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, role, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(db_id(id)?)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user whose username or email equals `login`
    ///
    /// An exact username match wins over an email match.
    pub async fn find_by_username_or_email(
        pool: &PgPool,
        login: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, role, password_hash, created_at, updated_at
            FROM users
            WHERE username = $1 OR lower(email) = lower($1)
            ORDER BY (username = $1) DESC
            LIMIT 1
            "#,
        )
        .bind(login)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Replaces a user's password hash
    ///
    /// # Returns
    ///
    /// `true` if a row was updated
    pub async fn update_password_hash(
        pool: &PgPool,
        id: u64,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(db_id(id)?)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
