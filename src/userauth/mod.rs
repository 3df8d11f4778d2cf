//! HTTP service: router, shared state, middleware wiring.

use anyhow::{Context, Result};
use axum::{
    extract::{MatchedPath, Request},
    http::HeaderName,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};

pub mod config;
pub mod handlers;
pub mod middleware;
mod openapi;

pub use config::AppConfig;

use crate::auth::{
    ledger::TokenLedger,
    lockout::LockoutPolicy,
    rate_limit::{RateGovernor, RateGovernorConfig},
    session::SessionCodec,
};
use crate::email::EmailSender;
use crate::store::{
    postgres::{PgAccountStore, PgAuditSink, PgTokenStore},
    AccountStore, AuditSink,
};

pub struct AppState {
    pub config: AppConfig,
    pub codec: SessionCodec,
    pub lockout: LockoutPolicy,
    pub governor: RateGovernor,
    pub accounts: Arc<dyn AccountStore + Send + Sync>,
    pub ledger: TokenLedger,
    pub audit: Arc<dyn AuditSink + Send + Sync>,
    pub email: Arc<dyn EmailSender>,
}

/// Build the API router on top of a prepared state.
///
/// Middleware runs rate governor first, then the CSRF guard; security
/// headers are stamped on every response on the way out.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/register", post(handlers::register::register))
        .route("/api/v1/login", post(handlers::login::login))
        .route("/api/v1/logout", post(handlers::session::logout))
        .route(
            "/api/v1/verify-email/:token",
            get(handlers::verify::verify_email),
        )
        .route(
            "/api/v1/resend-verification",
            post(handlers::verify::resend_verification),
        )
        .route(
            "/api/v1/password-reset/request",
            post(handlers::reset::request_reset),
        )
        .route(
            "/api/v1/password-reset/confirm",
            post(handlers::reset::confirm_reset),
        )
        .route("/api/v1/session", get(handlers::session::session))
        .route("/health", get(handlers::health::health))
        .route("/api-docs/openapi.json", get(openapi::serve))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    HeaderName::from_static("x-request-id"),
                    MakeRequestUuid,
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
                .layer(from_fn_with_state(state.clone(), middleware::csrf_guard))
                .layer(from_fn(middleware::security_headers))
                .layer(Extension(state.clone())),
        )
        .with_state(state)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, config: AppConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let codec = SessionCodec::new(config.signing_key())
        .with_ttl_seconds(config.session_ttl_seconds());
    let ledger = TokenLedger::new(Arc::new(PgTokenStore::new(pool.clone())))
        .with_ttl_seconds(config.token_ttl_seconds());

    let state = Arc::new(AppState {
        config,
        codec,
        lockout: LockoutPolicy::new(),
        governor: RateGovernor::new(RateGovernorConfig::new()),
        accounts: Arc::new(PgAccountStore::new(pool.clone())),
        ledger,
        audit: Arc::new(PgAuditSink::new(pool.clone())),
        email: Arc::new(crate::email::LogEmailSender),
    });

    let app = router(state).layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
