//! Role-gated endpoints
//!
//! Small routes that sit behind the different auth gates so every gate
//! configuration is reachable over HTTP.
//!
//! # Endpoints
//!
//! - `GET /api/admin/ping` - Admins only
//! - `GET /api/editorial/ping` - Admins and editors
//! - `GET /api/session` - Anyone; reports who is logged in
//! - `GET /admin` - Staff dashboard page; redirects to login

use axum::{response::Html, Extension, Json};
use newsdesk_shared::auth::middleware::{AuthContext, MaybeAuth};
use newsdesk_shared::models::user::UserIdentity;
use serde::Serialize;

/// Ping response
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
    pub user: UserIdentity,
}

/// Session status response
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
}

pub async fn ping(Extension(auth): Extension<AuthContext>) -> Json<PingResponse> {
    Json(PingResponse {
        ok: true,
        user: auth.user,
    })
}

pub async fn session(Extension(MaybeAuth(auth)): Extension<MaybeAuth>) -> Json<SessionStatus> {
    let user = auth.map(|auth| auth.user);
    Json(SessionStatus {
        authenticated: user.is_some(),
        user,
    })
}

/// Minimal staff dashboard
pub async fn dashboard(Extension(auth): Extension<AuthContext>) -> Html<String> {
    let name: String = auth
        .user
        .username
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();

    Html(format!(
        "<!doctype html><title>Newsdesk</title><h1>Newsdesk</h1><p>Signed in as {} ({})</p>",
        name, auth.user.role
    ))
}
