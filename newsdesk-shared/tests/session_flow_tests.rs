//! End-to-end session flows through the auth middleware
//!
//! Each test builds a small axum router guarded by the real middleware,
//! logs in through `AccountService` against the in-memory store, and drives
//! requests with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Extension, Json, Router,
};
use chrono::{Duration, Utc};
use newsdesk_shared::account::AccountService;
use newsdesk_shared::auth::authorization::{ADMIN_ONLY, STAFF};
use newsdesk_shared::auth::jwt::{Claims, TokenConfig, TokenService, TokenType};
use newsdesk_shared::auth::middleware::{optional_auth, require_auth, AuthContext, AuthGate, MaybeAuth};
use newsdesk_shared::auth::password::{CredentialHasher, HashCost, HashingPool};
use newsdesk_shared::models::user::Role;
use newsdesk_shared::store::MemoryUserStore;
use serde_json::{json, Value};
use tower::ServiceExt;

struct Harness {
    accounts: AccountService,
    tokens: Arc<TokenService>,
    app: Router,
}

async fn whoami(Extension(auth): Extension<AuthContext>) -> Json<Value> {
    Json(json!({ "username": auth.user.username, "role": auth.user.role }))
}

async fn maybe(Extension(MaybeAuth(auth)): Extension<MaybeAuth>) -> Json<Value> {
    Json(json!({ "user": auth.map(|a| a.user.username) }))
}

async fn harness() -> Harness {
    let tokens = Arc::new(TokenService::new(TokenConfig::new(
        "integration-secret-at-least-32-bytes!!",
        60,
        168,
        "newsdesk",
    )));
    let hasher = CredentialHasher::with_cost(HashCost {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("hasher");
    let accounts = AccountService::new(
        Arc::new(MemoryUserStore::new()),
        HashingPool::new(hasher, 2),
        tokens.clone(),
    );
    accounts
        .ensure_admin("admin", "admin@example.com", "admin123")
        .await
        .expect("bootstrap admin");

    let api = AuthGate::api(tokens.clone());

    let app = Router::new()
        .route(
            "/me",
            get(whoami).layer(middleware::from_fn_with_state(api.clone(), require_auth)),
        )
        .route(
            "/admin-only",
            get(whoami).layer(middleware::from_fn_with_state(
                api.clone().allow(ADMIN_ONLY),
                require_auth,
            )),
        )
        .route(
            "/maybe",
            get(maybe).layer(middleware::from_fn_with_state(api.clone(), optional_auth)),
        )
        .route(
            "/dashboard",
            get(whoami).layer(middleware::from_fn_with_state(
                AuthGate::page(tokens.clone(), "/login").allow(STAFF),
                require_auth,
            )),
        );

    Harness {
        accounts,
        tokens,
        app,
    }
}

async fn send(app: &Router, uri: &str, cookie: Option<String>, bearer: Option<&str>) -> Response {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_login_then_bearer_request() {
    let h = harness().await;
    let session = h.accounts.login("admin", "admin123").await.unwrap();

    let response = send(&h.app, "/me", None, Some(&session.tokens.access.token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["username"], "admin");
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn test_no_credentials_is_401_no_token() {
    let h = harness().await;

    let response = send(&h.app, "/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "no_token");
}

#[tokio::test]
async fn test_expired_access_cookie_refreshed_from_refresh_cookie() {
    let h = harness().await;
    let session = h.accounts.login("admin", "admin123").await.unwrap();

    let stale = Claims::new(
        &session.user.identity(),
        TokenType::Access,
        "newsdesk",
        Utc::now() - Duration::hours(2),
        Duration::hours(1),
    ).unwrap();
    let cookie = format!(
        "token={}; refresh_token={}",
        h.tokens.sign(&stale).unwrap(),
        session.tokens.refresh.token
    );

    let response = send(&h.app, "/me", Some(cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("refreshed cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("HttpOnly"));

    // The refreshed cookie works on its own
    let fresh = set_cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("token=")
        .to_string();
    let claims = h.tokens.validate(&fresh, TokenType::Access).unwrap();
    assert_eq!(claims.username, "admin");

    assert_eq!(json_body(response).await["username"], "admin");
}

#[tokio::test]
async fn test_expired_access_without_refresh_is_session_expired() {
    let h = harness().await;
    let session = h.accounts.login("admin", "admin123").await.unwrap();
    let stale = Claims::new(
        &session.user.identity(),
        TokenType::Access,
        "newsdesk",
        Utc::now() - Duration::hours(2),
        Duration::hours(1),
    ).unwrap();

    let response = send(
        &h.app,
        "/me",
        Some(format!("token={}", h.tokens.sign(&stale).unwrap())),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "session_expired");
}

#[tokio::test]
async fn test_role_gate_is_403_not_401() {
    let h = harness().await;
    h.accounts
        .register(newsdesk_shared::account::Registration {
            username: "reader".to_string(),
            email: "reader@example.com".to_string(),
            full_name: "Reader".to_string(),
            password: "Str0ng!Pass".to_string(),
        })
        .await
        .unwrap();
    let reader = h.accounts.login("reader", "Str0ng!Pass").await.unwrap();

    let response = send(&h.app, "/admin-only", None, Some(&reader.tokens.access.token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "forbidden");

    let admin = h.accounts.login("admin", "admin123").await.unwrap();
    let response = send(&h.app, "/admin-only", None, Some(&admin.tokens.access.token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forbidden_still_renews_expired_access_cookie() {
    let h = harness().await;
    let reader = h
        .accounts
        .register(newsdesk_shared::account::Registration {
            username: "reader".to_string(),
            email: "reader@example.com".to_string(),
            full_name: "Reader".to_string(),
            password: "Str0ng!Pass".to_string(),
        })
        .await
        .unwrap();
    let stale = Claims::new(
        &reader.user.identity(),
        TokenType::Access,
        "newsdesk",
        Utc::now() - Duration::hours(2),
        Duration::hours(1),
    )
    .unwrap();
    let cookie = format!(
        "token={}; refresh_token={}",
        h.tokens.sign(&stale).unwrap(),
        reader.tokens.refresh.token
    );

    let response = send(&h.app, "/admin-only", Some(cookie), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let renewed: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with("token="))
        .collect();
    assert_eq!(renewed.len(), 1);
    let token = renewed[0]
        .trim_start_matches("token=")
        .split(';')
        .next()
        .unwrap();
    let claims = h.tokens.validate(token, TokenType::Access).unwrap();
    assert_eq!(claims.user_id, reader.user.id);
    assert_eq!(claims.role, Role::User);
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let h = harness().await;
    let session = h.accounts.login("admin", "admin123").await.unwrap();

    let response = send(&h.app, "/me", None, Some(&session.tokens.refresh.token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_optional_user_never_rejects() {
    let h = harness().await;
    let session = h.accounts.login("admin", "admin123").await.unwrap();

    let anonymous = send(&h.app, "/maybe", None, None).await;
    assert_eq!(anonymous.status(), StatusCode::OK);
    assert_eq!(json_body(anonymous).await["user"], Value::Null);

    let garbage = send(&h.app, "/maybe", Some("token=garbage".to_string()), None).await;
    assert_eq!(garbage.status(), StatusCode::OK);
    assert_eq!(json_body(garbage).await["user"], Value::Null);

    let known = send(&h.app, "/maybe", None, Some(&session.tokens.access.token)).await;
    assert_eq!(json_body(known).await["user"], "admin");
}

#[tokio::test]
async fn test_page_surface_redirects_to_login() {
    let h = harness().await;

    let response = send(&h.app, "/dashboard", None, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("/login?error="));
}

#[tokio::test]
async fn test_revoked_access_token_rejected() {
    let h = harness().await;
    let session = h.accounts.login("admin", "admin123").await.unwrap();

    h.tokens.revoke(&session.tokens.access.claims);

    let response = send(&h.app, "/me", None, Some(&session.tokens.access.token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "session_expired");
}

#[tokio::test]
async fn test_role_in_token_is_authoritative() {
    let h = harness().await;
    let session = h.accounts.login("admin", "admin123").await.unwrap();
    assert_eq!(session.tokens.access.claims.role, Role::Admin);

    // No store lookup happens per request: the token alone carries the role
    let response = send(&h.app, "/admin-only", None, Some(&session.tokens.access.token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}
