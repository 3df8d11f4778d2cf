//! Request handlers and session plumbing shared between them.

use anyhow::anyhow;
use axum::http::{header, HeaderMap};
use std::sync::Arc;

use crate::auth::error::AuthError;
use crate::store::Account;
use crate::userauth::{middleware::cookie_value, AppState};

pub mod health;
pub mod login;
pub mod register;
pub mod reset;
pub mod session;
pub mod verify;

pub const SESSION_COOKIE_NAME: &str = "userauth_session";

/// Build the `Set-Cookie` value carrying a session token.
pub(super) fn session_cookie(token: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Expire the session cookie immediately.
pub(super) fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Pull the session token from the cookie or the `Authorization` header.
pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, SESSION_COOKIE_NAME).or_else(|| extract_bearer_token(headers))
}

/// Resolve the current account from the request headers.
///
/// Decodes the JWT, then resolves its subject against the account
/// store; a rotated session secret leaves a valid-looking JWT pointing
/// at nothing, which reads as an invalid token.
pub(super) async fn current_account(
    state: &Arc<AppState>,
    headers: &HeaderMap,
) -> Result<Account, AuthError> {
    let token = extract_session_token(headers).ok_or(AuthError::TokenInvalid)?;
    let claims = state.codec.decode(&token)?;
    state
        .accounts
        .find_by_session_secret(&claims.sub)
        .await
        .map_err(|err| AuthError::Internal(anyhow!(err)))?
        .ok_or(AuthError::TokenInvalid)
}
