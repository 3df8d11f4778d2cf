//! Random secret generation for tokens and session secrets.
//!
//! Values come from the OS CSPRNG; callers are responsible for rejecting
//! store collisions before use (see the token ledger retry loop).

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// Namespace tag so tokens are recognizable in logs and bug reports
/// without revealing anything about their contents.
pub const TOKEN_PREFIX: &str = "UA_";

/// Default length of the random part of a generated secret.
pub const DEFAULT_LENGTH: usize = 32;

/// Generate a `UA_`-prefixed token with `length` random alphanumeric
/// characters from the OS CSPRNG.
#[must_use]
pub fn generate(length: usize) -> String {
    // Floor at one random character so a zero never yields the bare
    // prefix, release builds included.
    let length = length.max(1);
    let suffix: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{TOKEN_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_prefix_and_length() {
        let token = generate(32);
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), TOKEN_PREFIX.len() + 32);
        assert!(token[TOKEN_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn consecutive_tokens_differ() {
        assert_ne!(generate(32), generate(32));
    }

    #[test]
    fn respects_requested_length() {
        for length in [1, 8, 64] {
            assert_eq!(generate(length).len(), TOKEN_PREFIX.len() + length);
        }
    }

    #[test]
    fn zero_length_still_gets_a_random_character() {
        let token = generate(0);
        assert_eq!(token.len(), TOKEN_PREFIX.len() + 1);
    }
}
