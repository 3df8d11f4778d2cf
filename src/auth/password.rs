//! One-way password storage with Argon2id.
//!
//! Each digest embeds its own random salt and parameters (PHC string
//! format), so verification needs nothing but the digest itself.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a plaintext password with a fresh random salt.
///
/// # Errors
/// Returns an error only if the hasher itself fails; the plaintext is
/// never included in the error.
pub fn hash(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(digest.to_string())
}

/// Verify a plaintext against a stored digest.
///
/// Never panics or errors: a malformed digest simply fails verification.
/// The comparison is constant-time inside the hasher.
#[must_use]
pub fn verify(plaintext: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trip() {
        let digest = hash("Str0ng!Pass99").unwrap();
        assert!(verify("Str0ng!Pass99", &digest));
        assert!(!verify("Str0ng!Pass98", &digest));
    }

    #[test]
    fn same_plaintext_hashes_differently() {
        let first = hash("Str0ng!Pass99").unwrap();
        let second = hash("Str0ng!Pass99").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_digest_fails_closed() {
        assert!(!verify("anything", "not-a-phc-string"));
        assert!(!verify("anything", ""));
        assert!(!verify("anything", "$argon2id$v=19$truncated"));
    }
}
