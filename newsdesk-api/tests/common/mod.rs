//! Common test utilities for integration tests
//!
//! Builds the full router over an in-memory identity store, so these tests
//! need neither PostgreSQL nor network access. Passwords are hashed with a
//! light Argon2 cost to keep the suite fast.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use newsdesk_shared::account::ResetDelivery;
use newsdesk_shared::auth::jwt::IssuedToken;
use newsdesk_shared::models::user::User;
use newsdesk_api::app::{build_router, AppState};
use newsdesk_api::config::Config;
use newsdesk_shared::account::{AccountService, Registration};
use newsdesk_shared::auth::jwt::TokenService;
use newsdesk_shared::auth::password::{CredentialHasher, HashCost, HashingPool};
use newsdesk_shared::store::MemoryUserStore;
use serde_json::Value;
use tower::ServiceExt;

pub const ADMIN_PASSWORD: &str = "admin123";

/// Reset tokens handed out by the account service, newest last
#[derive(Default)]
pub struct Outbox(Mutex<Vec<(String, String)>>);

impl Outbox {
    /// Latest reset token sent to `email`
    pub fn last_for(&self, email: &str) -> Option<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, token)| token.clone())
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ResetDelivery for Outbox {
    async fn deliver(&self, user: &User, reset: &IssuedToken) -> anyhow::Result<()> {
        self.0
            .lock()
            .unwrap()
            .push((user.email.clone(), reset.token.clone()));
        Ok(())
    }
}

/// Test context containing the router and the services behind it
pub struct TestContext {
    pub app: Router,
    pub accounts: AccountService,
    pub tokens: Arc<TokenService>,
    pub outbox: Arc<Outbox>,
}

impl TestContext {
    /// Creates a context with a bootstrap admin named `admin`
    pub async fn new() -> Self {
        Self::with_env(&[]).await
    }

    /// Same as [`TestContext::new`] with extra environment overrides
    pub async fn with_env(overrides: &[(&str, &str)]) -> Self {
        let mut vars: HashMap<String, String> = [
            ("DATABASE_URL", "postgresql://localhost/unused"),
            ("JWT_SECRET", "integration-test-secret-at-least-32-bytes"),
            ("AUTH_HASH_CONCURRENCY", "2"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in overrides {
            vars.insert(k.to_string(), v.to_string());
        }

        let config = Config::from_lookup(|key| vars.get(key).cloned()).expect("test config");

        let hasher = CredentialHasher::with_cost(HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("hasher");
        let tokens = Arc::new(TokenService::new(config.jwt.token_config()));
        let outbox = Arc::new(Outbox::default());
        let accounts = AccountService::new(
            Arc::new(MemoryUserStore::new()),
            HashingPool::new(hasher, config.auth.hash_concurrency),
            tokens.clone(),
        )
        .with_reset_delivery(outbox.clone());

        accounts
            .ensure_admin("admin", "admin@example.com", ADMIN_PASSWORD)
            .await
            .expect("bootstrap admin");

        let app = build_router(AppState::new(accounts.clone(), config));

        Self {
            app,
            accounts,
            tokens,
            outbox,
        }
    }

    /// Registers a `user`-role account directly through the service
    pub async fn create_reader(&self, username: &str, password: &str) {
        self.accounts
            .register(Registration {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                full_name: format!("Reader {}", username),
                password: password.to_string(),
            })
            .await
            .expect("register reader");
    }

    /// Access token for an existing account
    pub async fn access_token(&self, username: &str, password: &str) -> String {
        self.accounts
            .login(username, password)
            .await
            .expect("login")
            .tokens
            .access
            .token
    }

    /// Sends a request through the router
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.expect("infallible router")
    }
}

/// Request builder for JSON bodies
pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// JSON request carrying a bearer token
pub fn authed_json_request(method: Method, uri: &str, bearer: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Request builder with optional bearer token and cookie header
pub fn request(method: Method, uri: &str, bearer: Option<&str>, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All `Set-Cookie` values on a response
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the named cookie among the `Set-Cookie` headers
pub fn cookie_value(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    set_cookies(response).into_iter().find_map(|cookie| {
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix(&prefix))
            .map(str::to_string)
    })
}
