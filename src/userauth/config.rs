//! Service-level configuration assembled by the CLI.

use secrecy::SecretString;
use url::Url;

use crate::auth::{ledger, session};

#[derive(Clone, Debug)]
pub struct AppConfig {
    frontend_base_url: Url,
    signing_key: SecretString,
    session_ttl_seconds: i64,
    token_ttl_seconds: i64,
    cookie_secure: Option<bool>,
}

impl AppConfig {
    #[must_use]
    pub fn new(frontend_base_url: Url, signing_key: SecretString) -> Self {
        Self {
            frontend_base_url,
            signing_key,
            session_ttl_seconds: session::DEFAULT_TTL_SECONDS,
            token_ttl_seconds: ledger::DEFAULT_TTL_SECONDS,
            cookie_secure: None,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds.max(1);
        self
    }

    /// Force the `Secure` cookie attribute on or off. Without an
    /// override it follows the frontend URL scheme.
    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = Some(secure);
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &Url {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn signing_key(&self) -> &SecretString {
        &self.signing_key
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
            .unwrap_or_else(|| self.frontend_base_url.scheme() == "https")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_secure_follows_scheme() {
        let https = AppConfig::new(
            Url::parse("https://app.example.com").unwrap(),
            SecretString::from("k"),
        );
        assert!(https.cookie_secure());

        let http = AppConfig::new(
            Url::parse("http://localhost:3000").unwrap(),
            SecretString::from("k"),
        );
        assert!(!http.cookie_secure());
    }

    #[test]
    fn cookie_secure_override_wins() {
        let config = AppConfig::new(
            Url::parse("http://localhost:3000").unwrap(),
            SecretString::from("k"),
        )
        .with_cookie_secure(true);
        assert!(config.cookie_secure());
    }

    #[test]
    fn ttl_floors_at_one_second() {
        let config = AppConfig::new(
            Url::parse("https://app.example.com").unwrap(),
            SecretString::from("k"),
        )
        .with_session_ttl_seconds(0)
        .with_token_ttl_seconds(-5);
        assert_eq!(config.session_ttl_seconds(), 1);
        assert_eq!(config.token_ttl_seconds(), 1);
    }
}
