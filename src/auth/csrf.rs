//! Double-submit CSRF protection.
//!
//! The token lives in a cookie the browser sends automatically and must
//! be echoed back in a request header by page script. A cross-site
//! attacker can trigger the cookie but cannot read it, so the header
//! copy never matches.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use crate::auth::error::AuthError;

pub const CSRF_COOKIE_NAME: &str = "csrf_token";
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

const TOKEN_BYTES: usize = 32;

/// Methods that never mutate state and skip the check.
#[must_use]
pub fn is_safe_method(method: &str) -> bool {
    matches!(method, "GET" | "HEAD" | "OPTIONS" | "TRACE")
}

#[must_use]
pub fn issue_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Compare the cookie value against the header-submitted copy.
pub fn verify(cookie: Option<&str>, submitted: Option<&str>) -> Result<(), AuthError> {
    let (Some(cookie), Some(submitted)) = (cookie, submitted) else {
        return Err(AuthError::CsrfMissing);
    };
    if cookie.as_bytes().ct_eq(submitted.as_bytes()).into() {
        Ok(())
    } else {
        Err(AuthError::CsrfMismatch)
    }
}
