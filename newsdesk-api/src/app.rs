//! Application state and router builder
//!
//! This module defines the shared application state and provides
//! a function to build the Axum router with all routes and middleware.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use newsdesk_api::{app::{build_router, AppState}, config::Config};
//! use newsdesk_shared::account::AccountService;
//! use newsdesk_shared::auth::jwt::TokenService;
//! use newsdesk_shared::auth::password::{CredentialHasher, HashingPool};
//! use newsdesk_shared::store::MemoryUserStore;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let tokens = Arc::new(TokenService::new(config.jwt.token_config()));
//! let accounts = AccountService::new(
//!     Arc::new(MemoryUserStore::new()),
//!     HashingPool::new(CredentialHasher::new()?, config.auth.hash_concurrency),
//!     tokens,
//! );
//! let app = build_router(AppState::new(accounts, config));
//! # Ok(())
//! # }
//! ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer, routes};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use newsdesk_shared::{
    account::AccountService,
    auth::{
        authorization::{ADMIN_ONLY, STAFF},
        jwt::TokenService,
        middleware::{optional_auth, require_auth, AuthGate},
    },
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Login, registration and password flows
    pub accounts: AccountService,

    /// Token issuing, validation and revocation
    pub tokens: Arc<TokenService>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(accounts: AccountService, config: Config) -> Self {
        Self {
            tokens: accounts.tokens().clone(),
            accounts,
            config: Arc::new(config),
        }
    }

    /// Gate for JSON routes, honouring the cookie configuration
    pub fn api_gate(&self) -> AuthGate {
        AuthGate::api(self.tokens.clone()).secure_cookies(self.config.auth.secure_cookies)
    }

    /// Gate for HTML pages, redirecting to the configured login path
    pub fn page_gate(&self) -> AuthGate {
        AuthGate::page(self.tokens.clone(), self.config.auth.login_path.clone())
            .secure_cookies(self.config.auth.secure_cookies)
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                    # public
/// ├── /api/auth/
/// │   ├── POST /login                 # public
/// │   ├── POST /register              # public
/// │   ├── POST /refresh               # public
/// │   ├── POST /forgot-password       # public
/// │   ├── POST /reset-password        # public
/// │   ├── POST /logout                # authenticated
/// │   ├── GET  /me                    # authenticated
/// │   └── PUT  /change-password       # authenticated
/// ├── GET  /api/admin/ping            # admin
/// ├── GET  /api/editorial/ping        # admin, editor
/// ├── GET  /api/session               # optional
/// └── GET  /admin                     # admin, editor (page; redirects to login)
/// ```
///
/// # Middleware Stack
///
/// Applied in order (outermost first):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication (per-route basis)
pub fn build_router(state: AppState) -> Router {
    let api_gate = state.api_gate();

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Auth routes (public, no auth required)
    let public_auth_routes = Router::new()
        .route("/login", post(routes::auth::login))
        .route("/register", post(routes::auth::register))
        .route("/refresh", post(routes::auth::refresh))
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route("/reset-password", post(routes::auth::reset_password));

    // Auth routes that act on the current session
    let session_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .route("/me", get(routes::auth::me))
        .route("/change-password", put(routes::auth::change_password))
        .route_layer(from_fn_with_state(api_gate.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/admin/ping", get(routes::gated::ping))
        .route_layer(from_fn_with_state(api_gate.clone().allow(ADMIN_ONLY), require_auth));

    let editorial_routes = Router::new()
        .route("/editorial/ping", get(routes::gated::ping))
        .route_layer(from_fn_with_state(api_gate.clone().allow(STAFF), require_auth));

    let optional_routes = Router::new()
        .route("/session", get(routes::gated::session))
        .route_layer(from_fn_with_state(api_gate, optional_auth));

    let page_routes = Router::new()
        .route("/admin", get(routes::gated::dashboard))
        .route_layer(from_fn_with_state(state.page_gate().allow(STAFF), require_auth));

    let api_routes = Router::new()
        .nest("/auth", public_auth_routes.merge(session_routes))
        .merge(admin_routes)
        .merge(editorial_routes)
        .merge(optional_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        // Credentials are needed for the session cookies
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .merge(page_routes)
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
