//! Request extractors for the signed-in user: token from the session cookie, else from `Authorization: Bearer`.

use crate::auth::Claims;
use crate::error::{AppError, AuthError};
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

/// Name of the HTTP-only session cookie.
pub const AUTH_COOKIE: &str = "autonomy_token";

/// Value of cookie `name` in a `Cookie` header (`a=1; b=2`).
pub fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().trim_matches('"'))
        .filter(|v| !v.is_empty())
}

/// Session token from the cookie, falling back to a bearer token.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| cookie_value(h, AUTH_COOKIE));
    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    })
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        AUTH_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Any signed-in user. Rejects with 401.
#[derive(Clone, Debug)]
pub struct AuthUser(pub Claims);

/// A signed-in admin. Rejects with 401 when not signed in, 403 for other roles.
#[derive(Clone, Debug)]
pub struct AdminUser(pub Claims);

fn claims_from_parts(parts: &Parts, state: &AppState) -> Result<Claims, AuthError> {
    let token = token_from_headers(&parts.headers).ok_or(AuthError::MissingToken)?;
    state.jwt.verify(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match claims_from_parts(parts, state) {
            Ok(claims) => Ok(AuthUser(claims)),
            Err(e) => {
                tracing::warn!(path = %parts.uri.path(), error = %e, "rejected unauthenticated request");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            tracing::warn!(path = %parts.uri.path(), user_id = %claims.user_id, "rejected non-admin request");
            return Err(AuthError::Forbidden.into());
        }
        Ok(AdminUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_cookie_header() {
        let h = "theme=dark; autonomy_token=abc.def.ghi; other=1";
        assert_eq!(cookie_value(h, AUTH_COOKIE), Some("abc.def.ghi"));
        assert_eq!(cookie_value(h, "missing"), None);
        assert_eq!(cookie_value("autonomy_token=", AUTH_COOKIE), None);
    }

    #[test]
    fn cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(token_from_headers(&headers), Some("from-header"));
        headers.insert(header::COOKIE, HeaderValue::from_static("autonomy_token=from-cookie"));
        assert_eq!(token_from_headers(&headers), Some("from-cookie"));
    }

    #[test]
    fn cookie_flags() {
        let c = session_cookie("tok", 60, true);
        assert_eq!(c, "autonomy_token=tok; HttpOnly; SameSite=Lax; Path=/; Max-Age=60; Secure");
        assert!(clear_cookie(false).contains("Max-Age=0"));
        assert!(!clear_cookie(false).contains("Secure"));
    }
}
