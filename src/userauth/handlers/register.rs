//! Account registration.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::auth::{error::AuthError, password, policy};
use crate::email::{build_verify_url, verification_email};
use crate::store::{Account, AuditAction, AuditEvent, StoreError, TokenKind};
use crate::userauth::{middleware::extract_client_ip, AppState};

#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterRequest {
    pub fullname: String,
    pub username: String,
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub detail: String,
    pub strength_score: u8,
}

#[utoipa::path(
    post,
    path = "/api/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email sent", body = RegisterResponse),
        (status = 400, description = "Validation failed"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return AuthError::Validation(vec!["Missing payload".to_string()]).into_response();
    };

    let username = request.username.trim().to_string();
    let email = request.email.trim().to_lowercase();
    let fullname = request.fullname.trim().to_string();
    let plaintext = request.password.expose_secret();

    let mut errors = Vec::new();
    errors.extend(policy::validate_username(&username).errors);
    errors.extend(policy::validate_email(&email).errors);
    errors.extend(policy::validate_password(plaintext).errors);
    if fullname.is_empty() {
        errors.push("Full name must not be empty".to_string());
    }
    if !errors.is_empty() {
        return AuthError::Validation(errors).into_response();
    }

    let client = extract_client_ip(&headers, state.governor.config().trust_forwarded_for());

    let hash = match password::hash(plaintext) {
        Ok(hash) => hash,
        Err(err) => return AuthError::Internal(err).into_response(),
    };

    let account = Account::new(fullname.clone(), username, email.clone(), hash);
    let account = match state.accounts.create(account).await {
        Ok(account) => account,
        Err(StoreError::Duplicate) => {
            return AuthError::Validation(vec![
                "Username or email already registered".to_string()
            ])
            .into_response();
        }
        Err(err) => return AuthError::Internal(err.into()).into_response(),
    };

    let now = Utc::now();
    let token = match state
        .ledger
        .issue(account.id, TokenKind::EmailVerify, now)
        .await
    {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };

    // Delivery is best-effort; the resend endpoint covers lost mail.
    match build_verify_url(state.config.frontend_base_url(), &token) {
        Ok(link) => {
            let message = verification_email(&email, &fullname, &link);
            if let Err(err) = state.email.send(&message) {
                error!("Failed to send verification email: {err:#}");
            }
        }
        Err(err) => error!("Failed to build verification link: {err:#}"),
    }

    state
        .audit
        .record(
            AuditEvent::new(AuditAction::Registration, true, "account registered")
                .account(account.id)
                .client(client),
        )
        .await;

    info!(account_id = %account.id, "New account registered");

    let body = RegisterResponse {
        detail: "User registered successfully. Please check your email to verify your account."
            .to_string(),
        strength_score: policy::strength_score(plaintext),
    };
    (StatusCode::CREATED, Json(body)).into_response()
}
