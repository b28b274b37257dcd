use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use crate::app::auth::{AuthService, AuthSession};
use crate::http::AppError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "token";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: uuid::Uuid,
    pub session: AuthSession,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("you must be signed in"))?;

        let service = AuthService::new(state.db.clone(), state.tokens.clone());
        let session = service.authenticate(&token).await?;

        let session = session.ok_or_else(|| AppError::unauthorized("invalid or expired session"))?;
        Ok(AuthUser {
            user_id: session.user_id,
            session,
        })
    }
}

/// Session token from the `token` cookie, falling back to a bearer header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| token_from_cookie_header(value, SESSION_COOKIE));
    if from_cookie.is_some() {
        return from_cookie;
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub fn token_from_cookie_header(header_value: &str, name: &str) -> Option<String> {
    header_value
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value carrying a fresh session.
pub fn session_cookie(token: &str, max_age_seconds: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age_seconds
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn cleared_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}
