//! Session cookie helpers
//!
//! The access token travels in the `token` cookie and the refresh token in
//! the `refresh_token` cookie. Both are `HttpOnly`, `SameSite=Lax`, scoped to
//! `/`, and marked `Secure` when the request arrived over TLS or the
//! deployment forces secure cookies.

use axum::http::{header, HeaderMap};

/// Cookie name for the access token
pub const ACCESS_COOKIE: &str = "token";

/// Cookie name for the refresh token
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

/// Whether the request reached us over TLS, as reported by the proxy
pub fn is_secure_request(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Builds a `Set-Cookie` value
///
/// `max_age` of `None` makes a browser-session cookie.
pub fn session_cookie(name: &str, value: &str, max_age: Option<i64>, secure: bool) -> String {
    let max_age = max_age
        .map(|secs| format!("; Max-Age={}", secs.max(0)))
        .unwrap_or_default();
    let secure = if secure { "; Secure" } else { "" };

    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/{}{}",
        name, value, max_age, secure
    )
}

/// Builds a `Set-Cookie` value that deletes `name`
pub fn clear_cookie(name: &str, secure: bool) -> String {
    session_cookie(name, "", Some(0), secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_cookie(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_get_cookie_multiple() {
        let headers = with_cookie("foo=bar; token=abc123; refresh_token=xyz789");

        assert_eq!(get_cookie(&headers, ACCESS_COOKIE), Some("abc123"));
        assert_eq!(get_cookie(&headers, REFRESH_COOKIE), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_name_must_match_exactly() {
        let headers = with_cookie("refresh_token=xyz789");
        assert_eq!(get_cookie(&headers, ACCESS_COOKIE), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let headers = with_cookie("  token = abc123  ; foo=bar");
        assert_eq!(get_cookie(&headers, ACCESS_COOKIE), Some("abc123"));
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let headers = with_cookie("token=; foo=bar");
        assert_eq!(get_cookie(&headers, ACCESS_COOKIE), None);
        assert_eq!(get_cookie(&HeaderMap::new(), ACCESS_COOKIE), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        assert_eq!(
            session_cookie(ACCESS_COOKIE, "abc", Some(3600), false),
            "token=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=3600"
        );
        assert_eq!(
            session_cookie(ACCESS_COOKIE, "abc", None, true),
            "token=abc; HttpOnly; SameSite=Lax; Path=/; Secure"
        );
        assert_eq!(
            clear_cookie(REFRESH_COOKIE, true),
            "refresh_token=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Secure"
        );
    }

    #[test]
    fn test_forwarded_proto_marks_secure() {
        let mut headers = HeaderMap::new();
        assert!(!is_secure_request(&headers));

        headers.insert("x-forwarded-proto", HeaderValue::from_static("HTTPS"));
        assert!(is_secure_request(&headers));

        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        assert!(!is_secure_request(&headers));
    }
}
