//! JWT token generation and validation module
//!
//! Session tokens are HS256-signed JWTs carrying the user's identity
//! projection (`id`, `username`, `email`, `role`) and a `token_type` that
//! separates short-lived access tokens from long-lived refresh tokens.
//!
//! # Security
//!
//! - **Algorithm**: HS256 only. A token whose header names any other
//!   algorithm, `none` included, is rejected before the signature is looked at.
//! - **Expiration**: access TTL in minutes (default 60), refresh TTL in hours
//!   (default 168). No leeway; a token whose `exp` equals the current second is
//!   already expired.
//! - **Type confusion**: an access token is never accepted where a refresh
//!   token is expected and vice versa. Password reset tokens only reset
//!   passwords.
//! - **Revocation**: every token carries a random `jti`; logout puts it in the
//!   process-local [`Denylist`] until the token would have expired anyway.
//!
//! # Example
//!
//! ```
//! use newsdesk_shared::auth::jwt::{TokenConfig, TokenService, TokenType};
//! use newsdesk_shared::models::user::{Role, UserIdentity};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tokens = TokenService::new(TokenConfig::new(
//!     "a-secret-of-at-least-thirty-two-bytes!!",
//!     60,
//!     168,
//!     "newsdesk",
//! ));
//!
//! let identity = UserIdentity {
//!     id: 1,
//!     username: "admin".to_string(),
//!     email: "admin@example.com".to_string(),
//!     role: Role::Admin,
//! };
//!
//! let access = tokens.issue(&identity, TokenType::Access)?;
//! let claims = tokens.validate(&access.token, TokenType::Access)?;
//! assert_eq!(claims.identity(), identity);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::{Role, User, UserIdentity};

/// Error type for JWT operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JwtError {
    /// Not a well-formed token: wrong segment count, bad base64 or JSON,
    /// missing claims, or an unknown role
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Signature does not match the configured secret
    #[error("Token signature is invalid")]
    BadSignature,

    /// Header names an algorithm other than HS256
    #[error("Token algorithm is not accepted")]
    AlgorithmMismatch,

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Token's `nbf` is in the future
    #[error("Token is not valid yet")]
    NotYetValid,

    /// Token was issued for another purpose
    #[error("Expected {expected} token, got {actual} token")]
    WrongTokenType {
        expected: TokenType,
        actual: TokenType,
    },

    /// Token was issued by someone else
    #[error("Token issuer is not accepted")]
    InvalidIssuer,

    /// Token's `jti` is on the denylist
    #[error("Token has been revoked")]
    Revoked,

    /// Failed to sign a token
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Access token (short-lived, authorizes requests)
    Access,

    /// Refresh token (long-lived, only mints access tokens)
    Refresh,

    /// Single-use password reset token
    #[serde(rename = "password_reset")]
    PasswordReset,
}

impl TokenType {
    /// Gets token type as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims structure
///
/// # Standard Claims
///
/// - `sub`: Subject (user ID as a decimal string)
/// - `iss`: Issuer
/// - `iat`, `nbf`, `exp`: Unix seconds
/// - `jti`: Random token ID, used for revocation
///
/// # Custom Claims
///
/// - `user_id`, `username`, `email`, `role`: identity snapshot at issue time
/// - `token_type`: Access, refresh or password reset token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - User ID
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Token ID
    pub jti: Uuid,

    /// User ID (custom claim)
    pub user_id: u64,

    /// Username (custom claim)
    pub username: String,

    /// Email (custom claim)
    pub email: String,

    /// Role (custom claim)
    pub role: Role,

    /// Token type (custom claim)
    pub token_type: TokenType,
}

impl Claims {
    /// Creates claims for `identity`, valid from `issued_at` for `ttl`
    ///
    /// A zero or negative `ttl` produces claims that are already expired.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Signing` if `issued_at + ttl` is not representable
    pub fn new(
        identity: &UserIdentity,
        token_type: TokenType,
        issuer: &str,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, JwtError> {
        let iat = issued_at.timestamp();
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| JwtError::Signing("token lifetime out of range".to_string()))?;

        Ok(Self {
            sub: identity.id.to_string(),
            iss: issuer.to_string(),
            iat,
            nbf: iat,
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
            user_id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role,
            token_type,
        })
    }

    /// Identity projection carried by this token
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }

    /// Checks expiry against `now`; `exp == now` counts as expired
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}

const DEFAULT_RESET_HOURS: i64 = 24;

/// Token signing configuration, built once at startup
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC secret
    pub secret: String,

    /// Access token lifetime
    pub access_ttl: Duration,

    /// Refresh token lifetime
    pub refresh_ttl: Duration,

    /// Password reset token lifetime
    pub reset_ttl: Duration,

    /// Value of the `iss` claim, also required on validation
    pub issuer: String,
}

impl TokenConfig {
    /// Builds a config from the environment-style units: minutes for access
    /// tokens, hours for refresh tokens
    ///
    /// Lifetimes too large for `Duration` saturate; issuing then fails with
    /// `JwtError::Signing` instead of panicking. Reset tokens live 24 hours.
    pub fn new(
        secret: impl Into<String>,
        access_minutes: i64,
        refresh_hours: i64,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::try_minutes(access_minutes).unwrap_or(Duration::MAX),
            refresh_ttl: Duration::try_hours(refresh_hours).unwrap_or(Duration::MAX),
            reset_ttl: Duration::hours(DEFAULT_RESET_HOURS),
            issuer: issuer.into(),
        }
    }

    /// Overrides the password reset token lifetime, in hours
    pub fn with_reset_hours(mut self, hours: i64) -> Self {
        self.reset_ttl = Duration::try_hours(hours).unwrap_or(Duration::MAX);
        self
    }

    /// Lifetime for a token type
    pub fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
            TokenType::PasswordReset => self.reset_ttl,
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[redacted]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("reset_ttl", &self.reset_ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// A signed token and what it says
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact JWT
    pub token: String,

    /// Claims that were signed
    pub claims: Claims,

    /// Seconds until expiry at issue time
    pub expires_in: i64,
}

/// Access and refresh token minted together at login
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Revoked token IDs, each kept until its token would expire
///
/// Process-local. Replicas do not share it.
#[derive(Debug, Default)]
pub struct Denylist {
    revoked: DashMap<Uuid, i64>,
}

impl Denylist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revokes `jti` until `expires_at` (Unix seconds)
    pub fn revoke(&self, jti: Uuid, expires_at: i64) {
        self.purge_expired(Utc::now().timestamp());
        self.revoked.insert(jti, expires_at);
    }

    /// Whether `jti` has been revoked
    pub fn is_revoked(&self, jti: &Uuid) -> bool {
        self.revoked.contains_key(jti)
    }

    /// Drops entries whose token has expired; returns how many were removed
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.revoked.len();
        self.revoked.retain(|_, expires_at| *expires_at > now);
        before - self.revoked.len()
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Issues and validates session tokens
///
/// Holds the signing keys and the denylist. Safe to share behind an `Arc`.
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    denylist: Arc<Denylist>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .field("revoked", &self.denylist.len())
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Creates a token service with its own empty denylist
    pub fn new(config: TokenConfig) -> Self {
        Self::with_denylist(config, Arc::new(Denylist::new()))
    }

    /// Creates a token service sharing an existing denylist
    pub fn with_denylist(config: TokenConfig, denylist: Arc<Denylist>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            denylist,
            config,
        }
    }

    /// Signing configuration
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Shared denylist
    pub fn denylist(&self) -> &Arc<Denylist> {
        &self.denylist
    }

    /// Signs arbitrary claims with the service key
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Signing` if encoding fails
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Issues one token of `token_type` for `identity`, valid from now
    pub fn issue(
        &self,
        identity: &UserIdentity,
        token_type: TokenType,
    ) -> Result<IssuedToken, JwtError> {
        self.issue_at(identity, token_type, Utc::now())
    }

    fn issue_at(
        &self,
        identity: &UserIdentity,
        token_type: TokenType,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, JwtError> {
        let ttl = self.config.ttl(token_type);
        let claims = Claims::new(identity, token_type, &self.config.issuer, now, ttl)?;
        let token = self.sign(&claims)?;

        Ok(IssuedToken {
            token,
            claims,
            expires_in: ttl.num_seconds(),
        })
    }

    /// Issues an access and a refresh token for `user`
    ///
    /// Both tokens come from the same identity snapshot and the same `now`.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Signing` if either token cannot be signed
    pub fn issue_token_pair(&self, user: &User) -> Result<TokenPair, JwtError> {
        let identity = user.identity();
        let now = Utc::now();

        let pair = TokenPair {
            access: self.issue_at(&identity, TokenType::Access, now)?,
            refresh: self.issue_at(&identity, TokenType::Refresh, now)?,
        };

        tracing::debug!(user_id = identity.id, "issued token pair");
        Ok(pair)
    }

    /// Validates a token and checks it is of the `expected` type
    ///
    /// Verifies, in order:
    /// - header names HS256
    /// - signature matches
    /// - claims decode
    /// - token is not expired (`exp <= now` is expired) and `nbf` has passed
    /// - issuer matches
    /// - token type matches `expected`
    /// - `jti` is not revoked
    ///
    /// # Errors
    ///
    /// The first failed check, as a `JwtError`
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        check_algorithm(token)?;

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(classify)?
            .claims;

        if claims.is_expired_at(Utc::now().timestamp()) {
            return Err(JwtError::Expired);
        }

        if claims.token_type != expected {
            return Err(JwtError::WrongTokenType {
                expected,
                actual: claims.token_type,
            });
        }

        if self.denylist.is_revoked(&claims.jti) {
            return Err(JwtError::Revoked);
        }

        Ok(claims)
    }

    /// Mints a new access token from a valid refresh token
    ///
    /// The new token carries the refresh token's identity snapshot. No store
    /// lookup happens here.
    ///
    /// # Errors
    ///
    /// Any validation error of the refresh token, or `JwtError::Signing`
    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<IssuedToken, JwtError> {
        let refresh_claims = self.validate(refresh_token, TokenType::Refresh)?;
        self.issue(&refresh_claims.identity(), TokenType::Access)
    }

    /// Revokes a validated token until it expires
    pub fn revoke(&self, claims: &Claims) {
        self.denylist.revoke(claims.jti, claims.exp);
        tracing::debug!(
            user_id = claims.user_id,
            token_type = claims.token_type.as_str(),
            "token revoked"
        );
    }
}

/// Rejects anything whose header does not name HS256
fn check_algorithm(token: &str) -> Result<(), JwtError> {
    let mut segments = token.split('.');
    let header = segments.next().unwrap_or_default();

    if header.is_empty() || segments.count() != 2 {
        return Err(JwtError::Malformed("expected three segments".to_string()));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| JwtError::Malformed(format!("header encoding: {}", e)))?;
    let raw: RawHeader = serde_json::from_slice(&bytes)
        .map_err(|e| JwtError::Malformed(format!("header json: {}", e)))?;

    if raw.alg != "HS256" {
        return Err(JwtError::AlgorithmMismatch);
    }

    Ok(())
}

fn classify(err: jsonwebtoken::errors::Error) -> JwtError {
    match err.kind() {
        ErrorKind::InvalidSignature => JwtError::BadSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            JwtError::AlgorithmMismatch
        }
        ErrorKind::ExpiredSignature => JwtError::Expired,
        ErrorKind::ImmatureSignature => JwtError::NotYetValid,
        ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
        _ => JwtError::Malformed(err.to_string()),
    }
}
