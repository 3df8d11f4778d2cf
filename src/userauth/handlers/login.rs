//! Login and session issuance.

use axum::{
    extract::Extension,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::{error::AuthError, lockout::LockState, password};
use crate::store::{Account, AuditAction, AuditEvent};
use crate::userauth::{
    handlers::session_cookie,
    middleware::extract_client_ip,
    AppState,
};

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 401, description = "Invalid username or password"),
        (status = 423, description = "Account locked"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::Validation(vec!["Missing payload".to_string()]).into_response();
    };

    let client = extract_client_ip(&headers, state.governor.config().trust_forwarded_for());
    let now = Utc::now();

    let account = match state.accounts.find_by_username(request.username.trim()).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            // Burn a hash verification so unknown usernames cost the
            // same as wrong passwords.
            let _ = password::verify(request.password.expose_secret(), DUMMY_DIGEST);
            state
                .audit
                .record(
                    AuditEvent::new(AuditAction::LoginFailure, false, "unknown username")
                        .client(client),
                )
                .await;
            return AuthError::InvalidCredentials.into_response();
        }
        Err(err) => return AuthError::Internal(err.into()).into_response(),
    };

    let mut snapshot = account.clone();
    if let LockState::Locked { until } = state.lockout.check(&mut snapshot, now) {
        state
            .audit
            .record(
                AuditEvent::new(AuditAction::LoginFailure, false, "account locked")
                    .account(account.id)
                    .client(client),
            )
            .await;
        return AuthError::Locked { until }.into_response();
    }
    if account.lock_until.is_some() && snapshot.lock_until.is_none() {
        // Lazy unlock fired; persist it so the counter starts fresh.
        if let Err(err) = state.accounts.update(&snapshot).await {
            return AuthError::Internal(err.into()).into_response();
        }
    }

    if !password::verify(request.password.expose_secret(), &account.password_hash) {
        let lock = match state
            .accounts
            .record_login_failure(account.id, &state.lockout, now)
            .await
        {
            Ok(lock) => lock,
            Err(err) => return AuthError::Internal(err.into()).into_response(),
        };
        state
            .audit
            .record(
                AuditEvent::new(AuditAction::LoginFailure, false, "wrong password")
                    .account(account.id)
                    .client(client.clone()),
            )
            .await;
        if let LockState::Locked { until } = lock {
            warn!(account_id = %account.id, "Account locked after repeated failures");
            state
                .audit
                .record(
                    AuditEvent::new(AuditAction::Lockout, true, "lockout threshold reached")
                        .account(account.id)
                        .client(client),
                )
                .await;
            return AuthError::Locked { until }.into_response();
        }
        return AuthError::InvalidCredentials.into_response();
    }

    if let Err(err) = state.accounts.record_login_success(account.id, now).await {
        return AuthError::Internal(err.into()).into_response();
    }

    state
        .audit
        .record(
            AuditEvent::new(AuditAction::LoginSuccess, true, "session issued")
                .account(account.id)
                .client(client),
        )
        .await;

    info!(account_id = %account.id, "Login succeeded");

    issue_session(&state, &account)
}

fn issue_session(state: &Arc<AppState>, account: &Account) -> Response {
    let token = match state.codec.issue(&account.session_secret, Utc::now()) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };

    let expires_in = state.codec.ttl_seconds();
    let cookie = session_cookie(&token, expires_in, state.config.cookie_secure());
    let body = LoginResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        expires_in,
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    match header::HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
            response
        }
        Err(err) => AuthError::Internal(err.into()).into_response(),
    }
}

// Argon2id digest of an unused throwaway value; only here to equalize
// timing for unknown usernames.
const DUMMY_DIGEST: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$MDEyMzQ1Njc4OWFiY2RlZg$qLml5cdwb0N7sPLtLUOvOO0W1y/fclDWLkEXLMtuZSQ";
