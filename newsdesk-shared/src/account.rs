//! Account flows: login, registration, password change and reset
//!
//! [`AccountService`] ties the identity store, the hashing pool and the token
//! service together. HTTP handlers stay thin and only translate
//! [`AccountError`] into responses.
//!
//! # Login timing
//!
//! An unknown login name still costs one Argon2 verification (against the
//! hasher's dummy hash), and both failure paths return the same
//! `AccountError::InvalidCredentials`. Response time and body do not reveal
//! whether an account exists.
//!
//! # Password reset
//!
//! [`AccountService::request_password_reset`] issues a 24-hour
//! `password_reset` token and hands it to a [`ResetDelivery`]. It succeeds
//! whether or not the address belongs to an account.
//! [`AccountService::reset_password`] accepts each token once.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use newsdesk_shared::account::AccountService;
//! use newsdesk_shared::auth::jwt::{TokenConfig, TokenService};
//! use newsdesk_shared::auth::password::{CredentialHasher, HashingPool};
//! use newsdesk_shared::store::MemoryUserStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let accounts = AccountService::new(
//!     Arc::new(MemoryUserStore::new()),
//!     HashingPool::new(CredentialHasher::new()?, 4),
//!     Arc::new(TokenService::new(TokenConfig::new(
//!         "a-secret-of-at-least-thirty-two-bytes!!", 60, 168, "newsdesk",
//!     ))),
//! );
//!
//! accounts.ensure_admin("admin", "admin@example.com", "admin123").await?;
//! let session = accounts.login("admin", "admin123").await?;
//! println!("logged in as {}", session.user.username);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::auth::jwt::{IssuedToken, JwtError, TokenPair, TokenService, TokenType};
use crate::auth::password::{validate_password_strength, HashingPool, PasswordError};
use crate::models::user::{NewUser, Role, User};
use crate::store::{StoreError, UserStore};

/// Error type for account operations
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Unknown login name or wrong password; deliberately indistinguishable
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Username or email already taken
    #[error("{0}")]
    Conflict(String),

    /// Input rejected for a specific field
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// Account no longer exists
    #[error("Account not found")]
    NotFound,

    /// Reset token is malformed, expired, already used or for another purpose
    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    /// Store, hashing or signing failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AccountError::Conflict(msg),
            StoreError::Database(e) => AccountError::Internal(e.to_string()),
        }
    }
}

impl From<PasswordError> for AccountError {
    fn from(err: PasswordError) -> Self {
        AccountError::Internal(err.to_string())
    }
}

impl From<JwtError> for AccountError {
    fn from(err: JwtError) -> Self {
        AccountError::Internal(err.to_string())
    }
}

/// A freshly authenticated user and their tokens
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub user: User,
    pub tokens: TokenPair,
}

/// Input for self-service registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

/// Sends password reset tokens to their owners
#[async_trait]
pub trait ResetDelivery: Send + Sync {
    async fn deliver(&self, user: &User, reset: &IssuedToken) -> anyhow::Result<()>;
}

/// Records that a reset was requested without sending anything
///
/// The token itself never reaches the log.
#[derive(Debug, Default)]
pub struct LogResetDelivery;

#[async_trait]
impl ResetDelivery for LogResetDelivery {
    async fn deliver(&self, user: &User, reset: &IssuedToken) -> anyhow::Result<()> {
        info!(
            user_id = user.id,
            expires_in = reset.expires_in,
            "Password reset requested; no mail transport configured"
        );
        Ok(())
    }
}

/// Trimmed, lowercased email as stored
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Login, registration and password management
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    hashing: HashingPool,
    tokens: Arc<TokenService>,
    reset_delivery: Arc<dyn ResetDelivery>,
}

impl AccountService {
    pub fn new(store: Arc<dyn UserStore>, hashing: HashingPool, tokens: Arc<TokenService>) -> Self {
        Self {
            store,
            hashing,
            tokens,
            reset_delivery: Arc::new(LogResetDelivery),
        }
    }

    /// Replaces the reset token transport
    pub fn with_reset_delivery(mut self, delivery: Arc<dyn ResetDelivery>) -> Self {
        self.reset_delivery = delivery;
        self
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Authenticates by username or email and issues a token pair
    ///
    /// # Errors
    ///
    /// - `AccountError::InvalidCredentials` for an unknown user or wrong password
    /// - `AccountError::Internal` for store or signing failures
    pub async fn login(
        &self,
        login: &str,
        password: &str,
    ) -> Result<AuthenticatedSession, AccountError> {
        let user = self.store.find_by_username_or_email(login).await?;

        let verified = match &user {
            Some(user) => {
                self.hashing
                    .verify(user.password_hash.clone(), password.to_string())
                    .await
            }
            None => self.hashing.verify_dummy(password.to_string()).await,
        };

        let user = match user {
            Some(user) if verified => user,
            _ => {
                warn!("Login failed");
                return Err(AccountError::InvalidCredentials);
            }
        };

        let tokens = self.tokens.issue_token_pair(&user)?;
        info!(user_id = user.id, role = %user.role, "User logged in");

        Ok(AuthenticatedSession { user, tokens })
    }

    /// Creates a `user`-role account and logs it in
    ///
    /// The email is stored trimmed and lowercased.
    ///
    /// # Errors
    ///
    /// - `AccountError::Validation` on `password` if it is too weak
    /// - `AccountError::Conflict` if the username or email is taken
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<AuthenticatedSession, AccountError> {
        validate_password_strength(&registration.password).map_err(|message| {
            AccountError::Validation {
                field: "password".to_string(),
                message,
            }
        })?;

        let password_hash = self.hashing.hash(registration.password).await?;

        let user = self
            .store
            .create(NewUser {
                username: registration.username,
                email: normalize_email(&registration.email),
                full_name: registration.full_name,
                role: Role::User,
                password_hash,
            })
            .await?;

        info!(user_id = user.id, "User registered");

        let tokens = self.tokens.issue_token_pair(&user)?;
        Ok(AuthenticatedSession { user, tokens })
    }

    /// Loads the full account behind a token
    pub async fn profile(&self, user_id: u64) -> Result<User, AccountError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    /// Replaces the password after checking the current one
    ///
    /// Tokens issued before the change stay valid until they expire.
    ///
    /// # Errors
    ///
    /// - `AccountError::Validation` on `current_password` if it is wrong
    /// - `AccountError::Validation` on `new_password` if it is too weak
    /// - `AccountError::NotFound` if the account is gone
    pub async fn change_password(
        &self,
        user_id: u64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AccountError> {
        let user = self.profile(user_id).await?;

        if !self
            .hashing
            .verify(user.password_hash, current_password.to_string())
            .await
        {
            return Err(AccountError::Validation {
                field: "current_password".to_string(),
                message: "Current password is incorrect".to_string(),
            });
        }

        validate_password_strength(new_password).map_err(|message| AccountError::Validation {
            field: "new_password".to_string(),
            message,
        })?;

        let password_hash = self.hashing.hash(new_password.to_string()).await?;
        if !self.store.update_password_hash(user_id, password_hash).await? {
            return Err(AccountError::NotFound);
        }

        info!(user_id, "Password changed");
        Ok(())
    }

    /// Issues a reset token for the account owning `email` and delivers it
    ///
    /// Returns `Ok` for unknown addresses too, so callers cannot tell which
    /// emails are registered. Delivery failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// `AccountError::Internal` for store or signing failures
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AccountError> {
        let email = normalize_email(email);
        let user = match self.store.find_by_username_or_email(&email).await? {
            Some(user) if user.email.eq_ignore_ascii_case(&email) => user,
            _ => {
                info!("Password reset requested for unknown email");
                return Ok(());
            }
        };

        let reset = self.tokens.issue(&user.identity(), TokenType::PasswordReset)?;
        if let Err(e) = self.reset_delivery.deliver(&user, &reset).await {
            warn!(user_id = user.id, error = %e, "Failed to deliver password reset token");
        }
        Ok(())
    }

    /// Sets a new password using a reset token, then burns the token
    ///
    /// # Errors
    ///
    /// - `AccountError::InvalidResetToken` if the token does not validate as a
    ///   `password_reset` token or its account is gone
    /// - `AccountError::Validation` on `new_password` if it is too weak
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AccountError> {
        let claims = match self.tokens.validate(token, TokenType::PasswordReset) {
            Ok(claims) => claims,
            Err(JwtError::Signing(e)) => return Err(AccountError::Internal(e)),
            Err(e) => {
                warn!(error = %e, "Password reset rejected");
                return Err(AccountError::InvalidResetToken);
            }
        };

        validate_password_strength(new_password).map_err(|message| AccountError::Validation {
            field: "new_password".to_string(),
            message,
        })?;

        let password_hash = self.hashing.hash(new_password.to_string()).await?;
        if !self
            .store
            .update_password_hash(claims.user_id, password_hash)
            .await?
        {
            return Err(AccountError::InvalidResetToken);
        }

        self.tokens.revoke(&claims);
        info!(user_id = claims.user_id, "Password reset");
        Ok(())
    }

    /// Creates an admin account unless the username already exists
    ///
    /// Used at startup to bootstrap the first administrator. The password is
    /// not checked against the strength policy.
    ///
    /// # Returns
    ///
    /// `true` if the account was created
    pub async fn ensure_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<bool, AccountError> {
        if self.store.find_by_username_or_email(username).await?.is_some() {
            return Ok(false);
        }

        let password_hash = self.hashing.hash(password.to_string()).await?;
        let admin = self
            .store
            .create(NewUser {
                username: username.to_string(),
                email: normalize_email(email),
                full_name: "Administrator".to_string(),
                role: Role::Admin,
                password_hash,
            })
            .await?;

        info!(user_id = admin.id, "Bootstrap admin created");
        Ok(true)
    }
}
