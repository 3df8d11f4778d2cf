//! Request middleware: rate limiting, CSRF double-submit, security headers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{
    csrf,
    error::AuthError,
    rate_limit::RateDecision,
};
use crate::userauth::AppState;

/// Extract a client address for rate limiting from common proxy headers.
///
/// The forwarded-for chain is only honored when the deployment sits
/// behind a proxy it trusts; otherwise the header is client-controlled
/// and would let an attacker shard the limiter.
pub fn extract_client_ip(headers: &HeaderMap, trust_forwarded_for: bool) -> Option<String> {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if forwarded.is_some() {
            return forwarded.map(str::to_string);
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Pull a single cookie value out of the `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.governor.config().is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let addr = extract_client_ip(
        request.headers(),
        state.governor.config().trust_forwarded_for(),
    )
    .unwrap_or_else(|| "unknown".to_string());

    match state.governor.check(&addr) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Blocked { retry_after } => {
            let seconds = retry_after.as_secs().max(1);
            let mut response = AuthError::RateLimited {
                detail: format!("Too many requests. Try again in {seconds} seconds"),
            }
            .into_response();
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        RateDecision::Limited => AuthError::RateLimited {
            detail: "Rate limit exceeded".to_string(),
        }
        .into_response(),
    }
}

/// Double-submit CSRF guard.
///
/// Safe methods pass through and get a readable `csrf_token` cookie if
/// they do not carry one yet. Unsafe methods must echo that cookie in
/// the `X-CSRF-Token` header.
pub async fn csrf_guard(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let cookie = cookie_value(request.headers(), csrf::CSRF_COOKIE_NAME);

    if csrf::is_safe_method(request.method().as_str()) {
        let mut response = next.run(request).await;
        if cookie.is_none() {
            let token = csrf::issue_token();
            let secure = if state.config.cookie_secure() {
                "; Secure"
            } else {
                ""
            };
            // Deliberately not HttpOnly; page script must read it back.
            let cookie = format!(
                "{}={token}; Path=/; SameSite=Lax{secure}",
                csrf::CSRF_COOKIE_NAME
            );
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        return response;
    }

    let submitted = request
        .headers()
        .get(csrf::CSRF_HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match csrf::verify(cookie.as_deref(), submitted.as_deref()) {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "x-xss-protection",
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:; connect-src 'self'; frame-ancestors 'none';",
        ),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let map = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(
            extract_client_ip(&map, true),
            Some("203.0.113.9".to_string())
        );
    }

    #[test]
    fn forwarded_for_is_ignored_when_untrusted() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.9"),
            ("x-real-ip", "198.51.100.7"),
        ]);
        assert_eq!(
            extract_client_ip(&map, false),
            Some("198.51.100.7".to_string())
        );
    }

    #[test]
    fn missing_headers_yield_none() {
        assert_eq!(extract_client_ip(&HeaderMap::new(), true), None);
    }

    #[test]
    fn cookie_value_finds_named_cookie() {
        let map = headers(&[("cookie", "a=1; csrf_token=tok; b=2")]);
        assert_eq!(cookie_value(&map, "csrf_token"), Some("tok".to_string()));
        assert_eq!(cookie_value(&map, "missing"), None);
    }
}
