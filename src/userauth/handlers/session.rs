//! Current-session introspection and logout.

use axum::{
    extract::Extension,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{error::AuthError, secret};
use crate::store::{AuditAction, AuditEvent, SESSION_SECRET_LENGTH};
use crate::userauth::{
    handlers::{clear_session_cookie, current_account},
    middleware::extract_client_ip,
    AppState,
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionInfo {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub verified: bool,
    pub last_login: Option<DateTime<Utc>>,
}

#[utoipa::path(
    get,
    path = "/api/v1/session",
    responses(
        (status = 200, description = "Current account", body = SessionInfo),
        (status = 401, description = "No valid session")
    ),
    tag = "session"
)]
pub async fn session(headers: HeaderMap, state: Extension<Arc<AppState>>) -> Response {
    let account = match current_account(&state, &headers).await {
        Ok(account) => account,
        Err(err) => return err.into_response(),
    };

    let body = SessionInfo {
        id: account.id,
        fullname: account.fullname,
        username: account.username,
        email: account.email,
        role: account.role,
        verified: account.verified,
        last_login: account.last_login,
    };
    (StatusCode::OK, Json(body)).into_response()
}

#[utoipa::path(
    post,
    path = "/api/v1/logout",
    responses(
        (status = 200, description = "Session revoked, cookie cleared"),
        (status = 401, description = "No valid session")
    ),
    tag = "session"
)]
pub async fn logout(headers: HeaderMap, state: Extension<Arc<AppState>>) -> Response {
    let account = match current_account(&state, &headers).await {
        Ok(account) => account,
        Err(err) => return err.into_response(),
    };

    // Rotation revokes every token minted against the old secret, not
    // just the one presented here.
    let new_secret = secret::generate(SESSION_SECRET_LENGTH);
    if let Err(err) = state
        .accounts
        .rotate_session_secret(account.id, &new_secret)
        .await
    {
        return AuthError::Internal(err.into()).into_response();
    }

    let client = extract_client_ip(&headers, state.governor.config().trust_forwarded_for());
    state
        .audit
        .record(
            AuditEvent::new(AuditAction::Logout, true, "session revoked")
                .account(account.id)
                .client(client),
        )
        .await;

    info!(account_id = %account.id, "Logged out");

    let mut response = (
        StatusCode::OK,
        Json(json!({ "detail": "Logged out successfully" })),
    )
        .into_response();
    if let Ok(value) =
        header::HeaderValue::from_str(&clear_session_cookie(state.config.cookie_secure()))
    {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}
