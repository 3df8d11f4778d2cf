//! Password reset flow: request a link, confirm with a new password.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::auth::{error::AuthError, password, policy, secret};
use crate::email::{build_reset_url, password_reset_email};
use crate::store::{AuditAction, AuditEvent, TokenKind, SESSION_SECRET_LENGTH};
use crate::userauth::{middleware::extract_client_ip, AppState};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetConfirm {
    pub token: String,
    #[schema(value_type = String)]
    pub new_password: SecretString,
}

#[utoipa::path(
    post,
    path = "/api/v1/password-reset/request",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Uniform acknowledgement"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn request_reset(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ResetRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::Validation(vec!["Missing payload".to_string()]).into_response();
    };

    let email = request.email.trim().to_lowercase();
    let client = extract_client_ip(&headers, state.governor.config().trust_forwarded_for());

    // The answer never reveals whether the address exists.
    let acknowledgement = (
        StatusCode::OK,
        Json(json!({
            "detail": "If the account exists, a password reset link has been sent"
        })),
    )
        .into_response();

    let account = match state.accounts.find_by_email(&email).await {
        Ok(Some(account)) => account,
        Ok(None) => return acknowledgement,
        Err(err) => {
            error!("Reset lookup failed: {err:#}");
            return acknowledgement;
        }
    };

    match state
        .ledger
        .issue(account.id, TokenKind::PasswordReset, Utc::now())
        .await
    {
        Ok(token) => match build_reset_url(state.config.frontend_base_url(), &token) {
            Ok(link) => {
                let message = password_reset_email(&account.email, &account.fullname, &link);
                if let Err(err) = state.email.send(&message) {
                    error!("Failed to send reset email: {err:#}");
                }
            }
            Err(err) => error!("Failed to build reset link: {err:#}"),
        },
        Err(err) => error!("Failed to issue reset token: {err}"),
    }

    state
        .audit
        .record(
            AuditEvent::new(AuditAction::PasswordResetRequested, true, "reset requested")
                .account(account.id)
                .client(client),
        )
        .await;

    acknowledgement
}

#[utoipa::path(
    post,
    path = "/api/v1/password-reset/confirm",
    request_body = ResetConfirm,
    responses(
        (status = 200, description = "Password replaced, all sessions revoked"),
        (status = 400, description = "Validation failed or token already used"),
        (status = 401, description = "Invalid or expired token")
    ),
    tag = "auth"
)]
pub async fn confirm_reset(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ResetConfirm>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::Validation(vec!["Missing payload".to_string()]).into_response();
    };

    let plaintext = request.new_password.expose_secret();
    let verdict = policy::validate_password(plaintext);
    if !verdict.valid {
        return AuthError::Validation(verdict.errors).into_response();
    }

    let client = extract_client_ip(&headers, state.governor.config().trust_forwarded_for());
    let now = Utc::now();

    let account_id = match state
        .ledger
        .redeem(request.token.trim(), TokenKind::PasswordReset, now)
        .await
    {
        Ok(account_id) => account_id,
        Err(err) => return err.into_response(),
    };

    let account = match state.accounts.find_by_id(account_id).await {
        Ok(Some(account)) => account,
        Ok(None) => return AuthError::TokenInvalid.into_response(),
        Err(err) => return AuthError::Internal(err.into()).into_response(),
    };

    let password_hash = match password::hash(plaintext) {
        Ok(hash) => hash,
        Err(err) => return AuthError::Internal(err).into_response(),
    };
    // New secret orphans every outstanding session token.
    let session_secret = secret::generate(SESSION_SECRET_LENGTH);
    if let Err(err) = state
        .accounts
        .replace_credentials(account.id, &password_hash, &session_secret)
        .await
    {
        return AuthError::Internal(err.into()).into_response();
    }

    state
        .audit
        .record(
            AuditEvent::new(AuditAction::PasswordResetCompleted, true, "password replaced")
                .account(account.id)
                .client(client),
        )
        .await;

    info!(account_id = %account.id, "Password reset completed");

    (
        StatusCode::OK,
        Json(json!({ "detail": "Password has been reset successfully" })),
    )
        .into_response()
}
