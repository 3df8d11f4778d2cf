//! Email verification endpoints.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::auth::error::AuthError;
use crate::email::{build_verify_url, verification_email};
use crate::store::{AuditAction, AuditEvent, TokenKind};
use crate::userauth::{middleware::extract_client_ip, AppState};

#[utoipa::path(
    get,
    path = "/api/v1/verify-email/{token}",
    params(("token" = String, Path, description = "Verification token from the email link")),
    responses(
        (status = 200, description = "Email verified"),
        (status = 400, description = "Token already used"),
        (status = 401, description = "Invalid or expired token")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    let client = extract_client_ip(&headers, state.governor.config().trust_forwarded_for());
    let now = Utc::now();

    let account_id = match state
        .ledger
        .redeem(token.trim(), TokenKind::EmailVerify, now)
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

    if let Err(err) = state.accounts.mark_verified(account.id).await {
        return AuthError::Internal(err.into()).into_response();
    }

    state
        .audit
        .record(
            AuditEvent::new(AuditAction::EmailVerified, true, "email verified")
                .account(account.id)
                .client(client),
        )
        .await;

    info!(account_id = %account.id, "Email verified");

    (
        StatusCode::OK,
        Json(json!({ "detail": "Email verified successfully" })),
    )
        .into_response()
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Uniform acknowledgement"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::Validation(vec!["Missing payload".to_string()]).into_response();
    };

    let email = request.email.trim().to_lowercase();

    // The answer never reveals whether the address exists.
    let acknowledgement = (
        StatusCode::OK,
        Json(json!({
            "detail": "If the account exists and is unverified, a new link has been sent"
        })),
    )
        .into_response();

    let account = match state.accounts.find_by_email(&email).await {
        Ok(Some(account)) if !account.verified => account,
        Ok(_) => return acknowledgement,
        Err(err) => {
            error!("Resend lookup failed: {err:#}");
            return acknowledgement;
        }
    };

    match state
        .ledger
        .issue(account.id, TokenKind::EmailVerify, Utc::now())
        .await
    {
        Ok(token) => match build_verify_url(state.config.frontend_base_url(), &token) {
            Ok(link) => {
                let message = verification_email(&account.email, &account.fullname, &link);
                if let Err(err) = state.email.send(&message) {
                    error!("Failed to resend verification email: {err:#}");
                }
            }
            Err(err) => error!("Failed to build verification link: {err:#}"),
        },
        Err(err) => error!("Failed to issue verification token: {err}"),
    }

    acknowledgement
}
