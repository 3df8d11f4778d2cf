//! OpenAPI document assembly.

use axum::response::Json;
use utoipa::OpenApi;

use crate::userauth::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::register::register,
        handlers::login::login,
        handlers::verify::verify_email,
        handlers::verify::resend_verification,
        handlers::reset::request_reset,
        handlers::reset::confirm_reset,
        handlers::session::session,
        handlers::session::logout,
    ),
    components(schemas(
        handlers::health::Health,
        handlers::register::RegisterRequest,
        handlers::register::RegisterResponse,
        handlers::login::LoginRequest,
        handlers::login::LoginResponse,
        handlers::verify::ResendVerificationRequest,
        handlers::reset::ResetRequest,
        handlers::reset::ResetConfirm,
        handlers::session::SessionInfo,
    )),
    tags(
        (name = "auth", description = "Registration, login, verification, reset"),
        (name = "session", description = "Session introspection and logout"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn serve() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/register"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/login"));
        assert!(paths
            .iter()
            .any(|p| p.as_str() == "/api/v1/verify-email/{token}"));
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
    }
}
