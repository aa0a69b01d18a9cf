//! Authentication endpoints
//!
//! This module provides the session endpoints:
//! - Login and registration
//! - Token refresh
//! - Logout
//! - Current user and password change
//!
//! Tokens are returned in the JSON body for API clients and also set as
//! `HttpOnly` cookies for browsers. The access cookie is a session cookie
//! unless the client asks to be remembered.
//!
//! # Endpoints
//!
//! - `POST /api/auth/login` - Login and get tokens
//! - `POST /api/auth/register` - Register new user
//! - `POST /api/auth/refresh` - Refresh access token
//! - `POST /api/auth/logout` - Revoke tokens and clear cookies
//! - `GET /api/auth/me` - Current user
//! - `PUT /api/auth/change-password` - Change password
//! - `POST /api/auth/forgot-password` - Request a password reset token
//! - `POST /api/auth/reset-password` - Set a new password with a reset token

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use newsdesk_shared::{
    account::{AuthenticatedSession, Registration},
    auth::{
        cookie::{
            clear_cookie, get_cookie, is_secure_request, session_cookie, ACCESS_COOKIE,
            REFRESH_COOKIE,
        },
        jwt::TokenType,
        middleware::AuthContext,
    },
    models::user::{Role, User},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Access cookie lifetime when "remember me" is ticked (7 days)
const REMEMBER_ME_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Refresh cookie lifetime (30 days)
const REFRESH_COOKIE_SECONDS: i64 = 30 * 24 * 60 * 60;

type SetCookies = AppendHeaders<Vec<(header::HeaderName, String)>>;

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username or email address
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    /// Password
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Keep the access cookie across browser restarts
    #[serde(default)]
    pub remember: bool,
}

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Login name
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,

    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Display name
    #[validate(length(min = 1, max = 100, message = "Full name is required"))]
    pub full_name: String,

    /// Password (strength is checked by the account service)
    pub password: String,

    /// Must repeat `password`
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

/// Login and registration response
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// The authenticated account
    pub user: User,

    /// Access token
    pub access_token: String,

    /// Refresh token
    pub refresh_token: String,

    /// Always `Bearer`
    pub token_type: &'static str,

    /// Seconds until the access token expires
    pub expires_in: i64,
}

/// Refresh token request
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token; falls back to the `refresh_token` cookie
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token
    pub access_token: String,

    /// Always `Bearer`
    pub token_type: &'static str,

    /// Seconds until the access token expires
    pub expires_in: i64,
}

/// Current user response
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: u64,
    pub username: String,
    pub email: String,
    /// Role as carried by the access token
    pub role: Role,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
}

/// Change password request
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    /// Current password
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    /// New password
    pub new_password: String,

    /// Must repeat `new_password`
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

/// Logout request
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    /// Refresh token held by an API client, revoked alongside the cookie one
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Forgot password request
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Reset password request
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    /// Token from the reset message
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,

    /// New password
    pub new_password: String,

    /// Must repeat `new_password`
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

/// Plain acknowledgement body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn wants_secure(state: &AppState, headers: &HeaderMap) -> bool {
    state.config.auth.secure_cookies || is_secure_request(headers)
}

/// Cookies and body for a fresh session
fn session_response(
    session: AuthenticatedSession,
    remember: bool,
    secure: bool,
) -> (SetCookies, Json<SessionResponse>) {
    let access_max_age = remember.then_some(REMEMBER_ME_SECONDS);

    let cookies = AppendHeaders(vec![
        (
            header::SET_COOKIE,
            session_cookie(ACCESS_COOKIE, &session.tokens.access.token, access_max_age, secure),
        ),
        (
            header::SET_COOKIE,
            session_cookie(
                REFRESH_COOKIE,
                &session.tokens.refresh.token,
                Some(REFRESH_COOKIE_SECONDS),
                secure,
            ),
        ),
    ]);

    let body = Json(SessionResponse {
        expires_in: session.tokens.access.expires_in,
        access_token: session.tokens.access.token,
        refresh_token: session.tokens.refresh.token,
        token_type: "Bearer",
        user: session.user,
    });

    (cookies, body)
}

/// Login endpoint
///
/// Authenticates by username or email and returns a token pair.
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/login
/// Content-Type: application/json
///
/// {
///   "username": "admin",
///   "password": "admin123",
///   "remember": true
/// }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "user": { "id": 1, "username": "admin", "role": "admin", ... },
///   "access_token": "eyJ...",
///   "refresh_token": "eyJ...",
///   "token_type": "Bearer",
///   "expires_in": 3600
/// }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized` (`invalid_credentials`): Unknown user or wrong password
/// - `422 Unprocessable Entity`: Missing fields
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let session = state.accounts.login(req.username.trim(), &req.password).await?;

    Ok(session_response(session, req.remember, wants_secure(&state, &headers)))
}

/// Register a new user
///
/// New accounts always get the `user` role and are logged in immediately.
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/register
/// Content-Type: application/json
///
/// {
///   "username": "reader",
///   "email": "reader@example.com",
///   "full_name": "Avid Reader",
///   "password": "Str0ng!Pass",
///   "confirm_password": "Str0ng!Pass"
/// }
/// ```
///
/// # Response
///
/// `201 Created` with the same body and cookies as login.
///
/// # Errors
///
/// - `409 Conflict`: Username or email already taken
/// - `422 Unprocessable Entity`: Validation or password strength failed
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let session = state
        .accounts
        .register(Registration {
            username: req.username.trim().to_string(),
            email: req.email,
            full_name: req.full_name.trim().to_string(),
            password: req.password,
        })
        .await?;

    let (cookies, body) = session_response(session, false, wants_secure(&state, &headers));
    Ok((StatusCode::CREATED, cookies, body))
}

/// Token refresh endpoint
///
/// Exchanges a refresh token for a new access token. The refresh token is
/// read from the JSON body, or from the `refresh_token` cookie when the body
/// is absent.
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/refresh
/// Content-Type: application/json
///
/// { "refresh_token": "eyJ..." }
/// ```
///
/// # Response
///
/// ```json
/// { "access_token": "eyJ...", "token_type": "Bearer", "expires_in": 3600 }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Missing, invalid, expired or revoked refresh token
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<impl IntoResponse> {
    let from_body = body
        .and_then(|Json(req)| req.refresh_token)
        .filter(|token| !token.is_empty());

    let refresh_token = from_body
        .or_else(|| get_cookie(&headers, REFRESH_COOKIE).map(str::to_string))
        .ok_or_else(|| ApiError::Unauthorized("Missing refresh token".to_string()))?;

    let issued = state.tokens.refresh_access_token(&refresh_token)?;

    let cookie = session_cookie(
        ACCESS_COOKIE,
        &issued.token,
        Some(issued.expires_in),
        wants_secure(&state, &headers),
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(RefreshResponse {
            access_token: issued.token,
            token_type: "Bearer",
            expires_in: issued.expires_in,
        }),
    ))
}

/// Logout endpoint
///
/// Revokes the access token used for this request and every refresh token
/// presented with it, from the JSON body and from the refresh cookie. Refresh
/// tokens belonging to another user are ignored. Both cookies are cleared.
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/logout
/// Authorization: Bearer eyJ...
/// Content-Type: application/json
///
/// { "refresh_token": "eyJ..." }
/// ```
///
/// The body is optional.
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    state.tokens.denylist().revoke(auth.token_id, auth.expires_at);

    let from_body = body.and_then(|Json(req)| req.refresh_token);
    let from_cookie = get_cookie(&headers, REFRESH_COOKIE).map(str::to_string);

    for refresh_token in from_body.iter().chain(from_cookie.iter()) {
        match state.tokens.validate(refresh_token, TokenType::Refresh) {
            Ok(claims) if claims.user_id == auth.user.id => state.tokens.revoke(&claims),
            Ok(claims) => tracing::warn!(
                user_id = auth.user.id,
                token_user_id = claims.user_id,
                "Logout presented another user's refresh token"
            ),
            Err(e) => tracing::debug!(error = %e, "Logout refresh token not revocable"),
        }
    }

    tracing::info!(user_id = auth.user.id, "User logged out");

    let secure = wants_secure(&state, &headers);
    (
        AppendHeaders([
            (header::SET_COOKIE, clear_cookie(ACCESS_COOKIE, secure)),
            (header::SET_COOKIE, clear_cookie(REFRESH_COOKIE, secure)),
        ]),
        Json(MessageResponse {
            message: "Logged out",
        }),
    )
}

/// Current user endpoint
///
/// Identity and role come from the access token; display fields come from
/// the store.
///
/// # Errors
///
/// - `404 Not Found`: The account was deleted after the token was issued
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MeResponse>> {
    let user = state.accounts.profile(auth.user.id).await?;

    Ok(Json(MeResponse {
        id: auth.user.id,
        username: auth.user.username,
        email: auth.user.email,
        role: auth.user.role,
        full_name: user.full_name,
        created_at: user.created_at,
    }))
}

/// Change password endpoint
///
/// Tokens issued before the change stay valid until they expire.
///
/// # Endpoint
///
/// ```text
/// PUT /api/auth/change-password
/// Content-Type: application/json
///
/// {
///   "current_password": "Str0ng!Pass",
///   "new_password": "N3w!Password",
///   "confirm_password": "N3w!Password"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Wrong current password, weak or mismatched new password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state
        .accounts
        .change_password(auth.user.id, &req.current_password, &req.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password changed",
    }))
}

/// Forgot password endpoint
///
/// Issues a reset token for the account with this email and hands it to the
/// configured delivery. The response is the same whether or not the address
/// is registered.
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/forgot-password
/// Content-Type: application/json
///
/// { "email": "reader@example.com" }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Not an email address
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state.accounts.request_password_reset(&req.email).await?;

    Ok(Json(MessageResponse {
        message: "If the address is registered, a reset link has been sent",
    }))
}

/// Reset password endpoint
///
/// Each reset token works once. Existing sessions stay valid until they
/// expire.
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/reset-password
/// Content-Type: application/json
///
/// {
///   "token": "eyJ...",
///   "new_password": "N3w!Password",
///   "confirm_password": "N3w!Password"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Invalid, expired or already used token
/// - `422 Unprocessable Entity`: Weak or mismatched new password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state
        .accounts
        .reset_password(&req.token, &req.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password has been reset",
    }))
}
