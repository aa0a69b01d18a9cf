//! Authentication middleware for Axum
//!
//! Every protected request runs through the same small state machine:
//!
//! ```text
//! Unauthenticated -> TokenExtracted -> TokenValidated -> IdentityAttached
//!                          |                 ^
//!                          v                 |
//!                   RefreshAttempted --------+
//!                          |
//!                          v
//!                       Rejected
//! ```
//!
//! 1. The access token is taken from the `token` cookie, or failing that from
//!    `Authorization: Bearer <token>`. Neither present: `Rejected(NoToken)`.
//! 2. The token is validated as an access token.
//! 3. If that fails and a `refresh_token` cookie is present, one refresh is
//!    attempted. A fresh access token is minted, re-validated, and queued as a
//!    `Set-Cookie` on the response. Otherwise: `Rejected(SessionExpired)`.
//! 4. The identity is inserted into the request extensions as [`AuthContext`]
//!    (and [`MaybeAuth`]) and the handler runs.
//!
//! [`resolve_session`] is the pure core and knows nothing about `Next`.
//! [`require_auth`] and [`optional_auth`] wrap it for
//! `axum::middleware::from_fn_with_state`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{middleware, routing::get, Extension, Router};
//! use newsdesk_shared::auth::authorization::STAFF;
//! use newsdesk_shared::auth::jwt::{TokenConfig, TokenService};
//! use newsdesk_shared::auth::middleware::{require_auth, AuthContext, AuthGate};
//!
//! async fn dashboard(Extension(auth): Extension<AuthContext>) -> String {
//!     format!("Hello, {}!", auth.user.username)
//! }
//!
//! let tokens = Arc::new(TokenService::new(TokenConfig::new(
//!     "a-secret-of-at-least-thirty-two-bytes!!", 60, 168, "newsdesk",
//! )));
//!
//! let app: Router = Router::new()
//!     .route("/admin", get(dashboard))
//!     .layer(middleware::from_fn_with_state(
//!         AuthGate::page(tokens, "/login").allow(STAFF),
//!         require_auth,
//!     ));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::authorization::{require_role, AuthzError};
use super::cookie::{
    clear_cookie, get_cookie, is_secure_request, session_cookie, ACCESS_COOKIE, REFRESH_COOKIE,
};
use super::jwt::{Claims, JwtError, TokenService, TokenType};
use crate::models::user::{Role, UserIdentity};

/// States of the request authentication machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    TokenExtracted,
    TokenValidated,
    RefreshAttempted,
    IdentityAttached,
    Rejected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::TokenExtracted => "token_extracted",
            SessionState::TokenValidated => "token_validated",
            SessionState::RefreshAttempted => "refresh_attempted",
            SessionState::IdentityAttached => "identity_attached",
            SessionState::Rejected => "rejected",
        }
    }
}

fn transition(state: SessionState) {
    tracing::debug!(state = state.as_str(), "auth state");
}

/// Where the access token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    Bearer,
}

/// Authentication context added to request extensions
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    /// Identity snapshot from the access token
    pub user: UserIdentity,

    /// `jti` of the access token, needed to revoke it
    pub token_id: Uuid,

    /// `exp` of the access token
    pub expires_at: i64,
}

impl AuthContext {
    /// Creates auth context from validated access-token claims
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user: claims.identity(),
            token_id: claims.jti,
            expires_at: claims.exp,
        }
    }
}

/// Identity for routes where logging in is optional
#[derive(Debug, Clone, Default)]
pub struct MaybeAuth(pub Option<AuthContext>);

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct Session {
    pub context: AuthContext,

    /// `Set-Cookie` value for a refreshed access token
    pub refreshed_cookie: Option<String>,

    pub source: TokenSource,
}

/// Why a request was not let through
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// No access token in cookie or Authorization header
    #[error("no credentials presented")]
    NoToken,

    /// Access token invalid and no usable refresh token
    #[error("session expired: {0}")]
    SessionExpired(JwtError),

    /// Authenticated, but the role is not admitted
    #[error("forbidden: {0}")]
    Forbidden(AuthzError),
}

impl Rejection {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NoToken => "no_token",
            Rejection::SessionExpired(_) => "session_expired",
            Rejection::Forbidden(_) => "forbidden",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::NoToken | Rejection::SessionExpired(_) => StatusCode::UNAUTHORIZED,
            Rejection::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Human-readable message; never includes token details
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::NoToken => "Please log in to continue",
            Rejection::SessionExpired(_) => "Your session has expired, please log in again",
            Rejection::Forbidden(_) => "You do not have permission to access this resource",
        }
    }
}

/// Finds the access token: `token` cookie first, then a Bearer header
///
/// An Authorization header that is not `Bearer` counts as absent.
pub fn extract_token(headers: &HeaderMap) -> Option<(&str, TokenSource)> {
    if let Some(token) = get_cookie(headers, ACCESS_COOKIE) {
        return Some((token, TokenSource::Cookie));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| (token, TokenSource::Bearer))
}

/// Runs the state machine up to `TokenValidated`
///
/// `secure_cookies` forces the `Secure` attribute on a refreshed cookie;
/// it is also set when the request came in over TLS.
///
/// # Errors
///
/// `Rejection::NoToken` or `Rejection::SessionExpired`. Role checks are the
/// caller's business.
pub fn resolve_session(
    tokens: &TokenService,
    headers: &HeaderMap,
    secure_cookies: bool,
) -> Result<Session, Rejection> {
    transition(SessionState::Unauthenticated);

    let Some((token, source)) = extract_token(headers) else {
        transition(SessionState::Rejected);
        return Err(Rejection::NoToken);
    };
    transition(SessionState::TokenExtracted);

    let access_error = match tokens.validate(token, TokenType::Access) {
        Ok(claims) => {
            transition(SessionState::TokenValidated);
            return Ok(Session {
                context: AuthContext::from_claims(&claims),
                refreshed_cookie: None,
                source,
            });
        }
        Err(e) => e,
    };

    transition(SessionState::RefreshAttempted);
    tracing::debug!(reason = %access_error, "access token rejected");

    let Some(refresh_token) = get_cookie(headers, REFRESH_COOKIE) else {
        transition(SessionState::Rejected);
        return Err(Rejection::SessionExpired(access_error));
    };

    let refreshed = tokens
        .refresh_access_token(refresh_token)
        .and_then(|issued| {
            tokens
                .validate(&issued.token, TokenType::Access)
                .map(|claims| (issued, claims))
        });

    let (issued, claims) = match refreshed {
        Ok(ok) => ok,
        Err(e) => {
            tracing::debug!(reason = %e, "refresh failed");
            transition(SessionState::Rejected);
            return Err(Rejection::SessionExpired(e));
        }
    };

    transition(SessionState::TokenValidated);
    tracing::info!(user_id = claims.user_id, "access token refreshed");

    let secure = secure_cookies || is_secure_request(headers);
    Ok(Session {
        context: AuthContext::from_claims(&claims),
        refreshed_cookie: Some(session_cookie(
            ACCESS_COOKIE,
            &issued.token,
            Some(issued.expires_in),
            secure,
        )),
        source,
    })
}

/// How rejections are rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSurface {
    /// JSON `{"error", "message"}` with 401/403
    Api,

    /// 303 redirect to the login page, plain 403 page for `Forbidden`
    Page { login_path: String },
}

#[derive(Serialize)]
struct RejectionBody {
    error: &'static str,
    message: &'static str,
}

impl AuthSurface {
    /// Renders a rejection for this surface
    pub fn reject(&self, rejection: &Rejection, secure_cookies: bool) -> Response {
        let mut response = match self {
            AuthSurface::Api => (
                rejection.status(),
                Json(RejectionBody {
                    error: rejection.code(),
                    message: rejection.message(),
                }),
            )
                .into_response(),
            AuthSurface::Page { .. } if matches!(rejection, Rejection::Forbidden(_)) => (
                StatusCode::FORBIDDEN,
                Html(format!(
                    "<!doctype html><title>403 Forbidden</title><h1>403 Forbidden</h1><p>{}</p>",
                    rejection.message()
                )),
            )
                .into_response(),
            AuthSurface::Page { login_path } => {
                let message: String =
                    url::form_urlencoded::byte_serialize(rejection.message().as_bytes()).collect();
                Redirect::to(&format!("{}?error={}", login_path, message)).into_response()
            }
        };

        // Stale cookies would just fail again on the next request
        if matches!(rejection, Rejection::SessionExpired(_)) {
            let headers = response.headers_mut();
            for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
                if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, secure_cookies)) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}

/// Middleware state: token service, surface, and admitted roles
#[derive(Clone, Debug)]
pub struct AuthGate {
    tokens: Arc<TokenService>,
    surface: AuthSurface,
    allowed: Option<Arc<[Role]>>,
    secure_cookies: bool,
}

impl AuthGate {
    /// Gate for JSON API routes; any authenticated user passes
    pub fn api(tokens: Arc<TokenService>) -> Self {
        Self {
            tokens,
            surface: AuthSurface::Api,
            allowed: None,
            secure_cookies: false,
        }
    }

    /// Gate for server-rendered pages; failures redirect to `login_path`
    pub fn page(tokens: Arc<TokenService>, login_path: impl Into<String>) -> Self {
        Self {
            surface: AuthSurface::Page {
                login_path: login_path.into(),
            },
            ..Self::api(tokens)
        }
    }

    /// Only admit users whose role is in `roles`
    pub fn allow(mut self, roles: &[Role]) -> Self {
        self.allowed = Some(Arc::from(roles));
        self
    }

    /// Always mark cookies set by this gate `Secure`
    pub fn secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    pub fn surface(&self) -> &AuthSurface {
        &self.surface
    }

    fn reject(&self, rejection: Rejection) -> Response {
        tracing::debug!(code = rejection.code(), "request rejected");
        self.surface.reject(&rejection, self.secure_cookies)
    }
}

/// Middleware that requires an authenticated user, and optionally a role
///
/// # Errors
///
/// Renders 401 (`no_token`, `session_expired`) or 403 (`forbidden`) through
/// the gate's [`AuthSurface`]. A 403 still carries the access cookie renewed
/// from the refresh cookie, so the browser stops presenting the expired one.
pub async fn require_auth(State(gate): State<AuthGate>, req: Request, next: Next) -> Response {
    let session = match resolve_session(&gate.tokens, req.headers(), gate.secure_cookies) {
        Ok(session) => session,
        Err(rejection) => return gate.reject(rejection),
    };

    if let Some(allowed) = &gate.allowed {
        if let Err(e) = require_role(&session.context.user, allowed) {
            transition(SessionState::Rejected);
            let mut response = gate.reject(Rejection::Forbidden(e));
            if let Some(cookie) = session.refreshed_cookie {
                append_cookie(&mut response, &cookie);
            }
            return response;
        }
    }

    attach(session, req, next).await
}

/// Middleware that attaches the user if there is one and never rejects
///
/// Handlers extract `Extension<MaybeAuth>`; it is `MaybeAuth(None)` for
/// anonymous requests and for any token failure.
pub async fn optional_auth(State(gate): State<AuthGate>, mut req: Request, next: Next) -> Response {
    match resolve_session(&gate.tokens, req.headers(), gate.secure_cookies) {
        Ok(session) => attach(session, req, next).await,
        Err(rejection) => {
            tracing::debug!(code = rejection.code(), "continuing anonymously");
            req.extensions_mut().insert(MaybeAuth(None));
            next.run(req).await
        }
    }
}

async fn attach(session: Session, mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(session.context.clone());
    req.extensions_mut().insert(MaybeAuth(Some(session.context)));
    transition(SessionState::IdentityAttached);

    let mut response = next.run(req).await;

    // A handler that set the access cookie itself (logout) has the last word
    let handler_set_access = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&format!("{}=", ACCESS_COOKIE)));

    if let Some(cookie) = session.refreshed_cookie.filter(|_| !handler_set_access) {
        append_cookie(&mut response, &cookie);
    }

    response
}

fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "refreshed cookie is not a valid header"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenConfig;
    use chrono::{Duration, Utc};

    fn service() -> TokenService {
        TokenService::new(TokenConfig::new(
            "test-secret-key-at-least-32-bytes-long",
            60,
            168,
            "newsdesk",
        ))
    }

    fn identity() -> UserIdentity {
        UserIdentity {
            id: 3,
            username: "reader".to_string(),
            email: "reader@example.com".to_string(),
            role: Role::User,
        }
    }

    fn headers(pairs: &[(header::HeaderName, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_prefers_cookie() {
        let map = headers(&[
            (header::COOKIE, "token=from-cookie".to_string()),
            (header::AUTHORIZATION, "Bearer from-header".to_string()),
        ]);
        assert_eq!(
            extract_token(&map),
            Some(("from-cookie", TokenSource::Cookie))
        );
    }

    #[test]
    fn test_extract_bearer_and_non_bearer() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer abc".to_string())]);
        assert_eq!(extract_token(&map), Some(("abc", TokenSource::Bearer)));

        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".to_string())]);
        assert_eq!(extract_token(&map), None);

        let map = headers(&[(header::AUTHORIZATION, "Bearer ".to_string())]);
        assert_eq!(extract_token(&map), None);
    }

    #[test]
    fn test_no_credentials_is_no_token() {
        let result = resolve_session(&service(), &HeaderMap::new(), false);
        assert_eq!(result.unwrap_err(), Rejection::NoToken);
    }

    #[test]
    fn test_refresh_cookie_alone_is_no_token() {
        let tokens = service();
        let refresh = tokens.issue(&identity(), TokenType::Refresh).unwrap().token;
        let map = headers(&[(header::COOKIE, format!("refresh_token={}", refresh))]);

        assert_eq!(
            resolve_session(&tokens, &map, false).unwrap_err(),
            Rejection::NoToken
        );
    }

    #[test]
    fn test_valid_bearer_resolves() {
        let tokens = service();
        let access = tokens.issue(&identity(), TokenType::Access).unwrap();
        let map = headers(&[(header::AUTHORIZATION, format!("Bearer {}", access.token))]);

        let session = resolve_session(&tokens, &map, false).expect("Should resolve");
        assert_eq!(session.context.user, identity());
        assert_eq!(session.context.token_id, access.claims.jti);
        assert_eq!(session.source, TokenSource::Bearer);
        assert!(session.refreshed_cookie.is_none());
    }

    #[test]
    fn test_expired_access_without_refresh_is_session_expired() {
        let tokens = service();
        let stale = Claims::new(
            &identity(),
            TokenType::Access,
            "newsdesk",
            Utc::now() - Duration::hours(3),
            Duration::hours(1),
        ).unwrap();
        let map = headers(&[(header::COOKIE, format!("token={}", tokens.sign(&stale).unwrap()))]);

        assert_eq!(
            resolve_session(&tokens, &map, false).unwrap_err(),
            Rejection::SessionExpired(JwtError::Expired)
        );
    }

    #[test]
    fn test_expired_access_with_refresh_cookie_is_renewed() {
        let tokens = service();
        let stale = Claims::new(
            &identity(),
            TokenType::Access,
            "newsdesk",
            Utc::now() - Duration::hours(3),
            Duration::hours(1),
        ).unwrap();
        let refresh = tokens.issue(&identity(), TokenType::Refresh).unwrap().token;
        let map = headers(&[
            (
                header::COOKIE,
                format!("token={}; refresh_token={}", tokens.sign(&stale).unwrap(), refresh),
            ),
            (header::HeaderName::from_static("x-forwarded-proto"), "https".to_string()),
        ]);

        let session = resolve_session(&tokens, &map, false).expect("Should refresh");
        assert_eq!(session.context.user, identity());

        let cookie = session.refreshed_cookie.expect("cookie should be queued");
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn test_access_token_in_refresh_cookie_rejected() {
        let tokens = service();
        let access = tokens.issue(&identity(), TokenType::Access).unwrap().token;
        let map = headers(&[(
            header::COOKIE,
            format!("token=garbage; refresh_token={}", access),
        )]);

        assert!(matches!(
            resolve_session(&tokens, &map, false),
            Err(Rejection::SessionExpired(JwtError::WrongTokenType { .. }))
        ));
    }

    #[test]
    fn test_rejection_codes() {
        assert_eq!(Rejection::NoToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Rejection::SessionExpired(JwtError::Expired).code(),
            "session_expired"
        );
        let forbidden = Rejection::Forbidden(AuthzError::NotAuthorized);
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(forbidden.code(), "forbidden");
    }

    #[test]
    fn test_page_surface_redirects_with_error() {
        let surface = AuthSurface::Page {
            login_path: "/login".to_string(),
        };

        let response = surface.reject(&Rejection::NoToken, false);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/login?error="));
        assert!(location.contains("log+in"));

        let response = surface.reject(&Rejection::Forbidden(AuthzError::NotAuthorized), false);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_session_expired_clears_cookies() {
        let response =
            AuthSurface::Api.reject(&Rejection::SessionExpired(JwtError::Expired), false);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let cleared: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cleared.len(), 2);
        assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
    }
}
