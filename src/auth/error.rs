//! Error taxonomy for the authentication engine.
//!
//! Every operation fails in one of a small closed set of ways; the HTTP
//! boundary maps variants to status codes without inspecting messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Policy violations, user-correctable. Carries every violation so
    /// the caller sees them all in one round trip.
    #[error("validation failed")]
    Validation(Vec<String>),

    /// Bad credentials or missing/invalid session.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Account temporarily locked after repeated failed attempts.
    #[error("Account is locked until {until}")]
    Locked { until: DateTime<Utc> },

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has already been used")]
    TokenAlreadyUsed,

    #[error("{detail}")]
    RateLimited { detail: String },

    #[error("CSRF token missing")]
    CsrfMissing,

    #[error("CSRF token invalid")]
    CsrfMismatch,

    /// Unclassified fallback for anything unexpected.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::TokenAlreadyUsed => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::TokenInvalid | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Locked { .. } => StatusCode::LOCKED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CsrfMissing | Self::CsrfMismatch => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(errors) => json!({
                "detail": "Validation error",
                "errors": errors,
            }),
            Self::Internal(err) => {
                error!("Unexpected error: {err:#}");
                json!({ "detail": "An unexpected error occurred. Please try again later." })
            }
            other => json!({ "detail": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn status_codes_per_variant() {
        assert_eq!(
            AuthError::Validation(vec![]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Locked { until: Utc::now() }.status_code(),
            StatusCode::LOCKED
        );
        assert_eq!(
            AuthError::TokenInvalid.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::TokenExpired.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::TokenAlreadyUsed.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::RateLimited {
                detail: "Rate limit exceeded".to_string()
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AuthError::CsrfMissing.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::CsrfMismatch.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::Internal(anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn locked_message_carries_unlock_time() {
        let until = Utc::now();
        let err = AuthError::Locked { until };
        assert!(err.to_string().contains(&until.to_string()));
    }
}
