//! Configuration management for the API server
//!
//! This module loads configuration from environment variables (and a `.env`
//! file when present) into a type-safe struct that is built once in `main`
//! and handed to everything that needs it.
//!
//! # Environment Variables
//!
//! - `API_HOST`: Host to bind to (default: 0.0.0.0)
//! - `API_PORT`: Port to bind to (default: 8080)
//! - `CORS_ORIGINS`: Comma-separated allowed origins (default: `*`)
//! - `APP_ENV`: `production` enables HSTS and secure cookies (default: development)
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
//! - `JWT_SECRET`: HMAC key for session tokens, at least 32 characters (required)
//! - `JWT_ACCESS_TOKEN_EXP`: Access token lifetime in minutes (default: 60, max: 1440)
//! - `JWT_REFRESH_TOKEN_EXP`: Refresh token lifetime in hours (default: 168, max: 8760)
//! - `JWT_RESET_TOKEN_EXP`: Password reset token lifetime in hours (default: 24, max: 168)
//! - `JWT_ISSUER`: `iss` claim (default: newsdesk)
//! - `AUTH_SECURE_COOKIES`: Force `Secure` cookies (default: on in production)
//! - `AUTH_LOGIN_PATH`: Where page routes send unauthenticated users (default: /login)
//! - `AUTH_HASH_CONCURRENCY`: Concurrent password hashes (default: CPU count)
//! - `ADMIN_USERNAME`, `ADMIN_EMAIL`, `ADMIN_PASSWORD`: Bootstrap admin account
//! - `RUST_LOG`: Log filter
//!
//! # Example
//!
//! ```no_run
//! use newsdesk_api::config::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Server will listen on {}", config.bind_address());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::str::FromStr;

use anyhow::Context;
use newsdesk_shared::auth::jwt::TokenConfig;
use newsdesk_shared::auth::password::default_concurrency;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Session and credential handling
    pub auth: AuthConfig,

    /// Admin account created at startup if missing
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Running in production
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be at least 32 characters. Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Access token lifetime in minutes
    pub access_token_minutes: i64,

    /// Refresh token lifetime in hours
    pub refresh_token_hours: i64,

    /// Password reset token lifetime in hours
    pub reset_token_hours: i64,

    /// Issuer claim
    pub issuer: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[redacted]")
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_hours", &self.refresh_token_hours)
            .field("reset_token_hours", &self.reset_token_hours)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtConfig {
    /// Token service configuration
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig::new(
            self.secret.clone(),
            self.access_token_minutes,
            self.refresh_token_hours,
            self.issuer.clone(),
        )
        .with_reset_hours(self.reset_token_hours)
    }
}

/// Session handling configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Always mark session cookies `Secure`
    pub secure_cookies: bool,

    /// Login page for page-surface redirects
    pub login_path: String,

    /// Maximum concurrent password hash operations
    pub hash_concurrency: usize,
}

/// Bootstrap admin credentials
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

const MAX_ACCESS_MINUTES: i64 = 24 * 60;
const MAX_REFRESH_HOURS: i64 = 365 * 24;
const MAX_RESET_HOURS: i64 = 7 * 24;

fn check_lifetime(key: &str, value: i64, max: i64) -> anyhow::Result<()> {
    if value <= 0 || value > max {
        anyhow::bail!("{} must be between 1 and {}, got {}", key, max, value);
    }
    Ok(())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    /// - `JWT_SECRET` is shorter than 32 characters
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let production = lookup("APP_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let api = ApiConfig {
            host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "API_PORT", 8080u16)?,
            cors_origins,
            production,
        };

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?,
        };

        let secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if secret.chars().count() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let jwt = JwtConfig {
            secret,
            access_token_minutes: parse_or(&lookup, "JWT_ACCESS_TOKEN_EXP", 60i64)?,
            refresh_token_hours: parse_or(&lookup, "JWT_REFRESH_TOKEN_EXP", 168i64)?,
            reset_token_hours: parse_or(&lookup, "JWT_RESET_TOKEN_EXP", 24i64)?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "newsdesk".to_string()),
        };
        check_lifetime("JWT_ACCESS_TOKEN_EXP", jwt.access_token_minutes, MAX_ACCESS_MINUTES)?;
        check_lifetime("JWT_REFRESH_TOKEN_EXP", jwt.refresh_token_hours, MAX_REFRESH_HOURS)?;
        check_lifetime("JWT_RESET_TOKEN_EXP", jwt.reset_token_hours, MAX_RESET_HOURS)?;

        let secure_cookies = match lookup("AUTH_SECURE_COOKIES") {
            Some(raw) => parse_flag(&raw)
                .ok_or_else(|| anyhow::anyhow!("AUTH_SECURE_COOKIES must be true or false"))?,
            None => production,
        };

        let auth = AuthConfig {
            secure_cookies,
            login_path: lookup("AUTH_LOGIN_PATH").unwrap_or_else(|| "/login".to_string()),
            hash_concurrency: parse_or(&lookup, "AUTH_HASH_CONCURRENCY", default_concurrency())?
                .max(1),
        };

        let bootstrap_admin = match (
            lookup("ADMIN_USERNAME"),
            lookup("ADMIN_EMAIL"),
            lookup("ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(BootstrapAdmin {
                username,
                email,
                password,
            }),
            (None, None, None) => None,
            _ => anyhow::bail!(
                "ADMIN_USERNAME, ADMIN_EMAIL and ADMIN_PASSWORD must be set together"
            ),
        };

        Ok(Self {
            api,
            database,
            jwt,
            auth,
            bootstrap_admin,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
