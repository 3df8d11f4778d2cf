//! Composable policy validators for passwords, usernames, and emails.
//!
//! Validators never fail on malformed input; they return a [`Verdict`]
//! with every violation so callers can show them all in one round trip.

use regex::Regex;

pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_MAX_LENGTH: usize = 128;
pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 50;

const PASSWORD_SYMBOLS: &str = "!@#$%^&*(),.?\":{}|<>";

const SEQUENTIAL_DIGITS: [&str; 9] = [
    "012", "123", "234", "345", "456", "567", "678", "789", "890",
];

const SEQUENTIAL_LETTERS: [&str; 24] = [
    "abc", "bcd", "cde", "def", "efg", "fgh", "ghi", "hij", "ijk", "jkl", "klm", "lmn", "mno",
    "nop", "opq", "pqr", "qrs", "rst", "stu", "tuv", "uvw", "vwx", "wxy", "xyz",
];

const COMMON_PASSWORDS: [&str; 10] = [
    "password",
    "12345678",
    "qwerty",
    "abc123",
    "letmein",
    "admin123",
    "welcome",
    "monkey",
    "1234567890",
    "password123",
];

const RESERVED_USERNAMES: [&str; 7] = ["admin", "root", "system", "user", "guest", "api", "test"];

const DISPOSABLE_DOMAINS: [&str; 5] = [
    "tempmail.com",
    "throwaway.email",
    "10minutemail.com",
    "guerrillamail.com",
    "mailinator.com",
];

/// Result of a policy check: valid iff no errors were collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Verdict {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[must_use]
pub fn validate_password(password: &str) -> Verdict {
    let mut errors = Vec::new();

    if password.chars().count() < PASSWORD_MIN_LENGTH {
        errors.push(format!(
            "Password must be at least {PASSWORD_MIN_LENGTH} characters long"
        ));
    }
    if password.chars().count() > PASSWORD_MAX_LENGTH {
        errors.push(format!(
            "Password must not exceed {PASSWORD_MAX_LENGTH} characters"
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one digit".to_string());
    }
    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        errors.push("Password must contain at least one special character".to_string());
    }
    if has_common_pattern(password) {
        errors.push("Password contains common patterns".to_string());
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        errors.push("Password is too common".to_string());
    }

    Verdict::from_errors(errors)
}

/// Advisory 0-100 strength score for UI feedback; never gates acceptance.
#[must_use]
pub fn strength_score(password: &str) -> u8 {
    let length = password.chars().count();
    let mut score: i64 = 0;

    // Length contribution is capped so long-but-trivial passwords
    // cannot saturate the score.
    if length >= PASSWORD_MIN_LENGTH {
        score += 30.min(length as i64 * 2);
    }

    if password.chars().any(|c| c.is_ascii_lowercase()) {
        score += 10;
    }
    if password.chars().any(|c| c.is_ascii_uppercase()) {
        score += 10;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        score += 10;
    }
    if password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        score += 20;
    }

    let unique_chars = {
        let mut chars: Vec<char> = password.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        chars.len() as i64
    };
    score += 20.min(unique_chars * 2);

    if has_repeated_run(password) {
        score -= 10;
    }

    score.clamp(0, 100) as u8
}

#[must_use]
pub fn validate_username(username: &str) -> Verdict {
    let mut errors = Vec::new();

    if username.chars().count() < USERNAME_MIN_LENGTH {
        errors.push(format!(
            "Username must be at least {USERNAME_MIN_LENGTH} characters long"
        ));
    }
    if username.chars().count() > USERNAME_MAX_LENGTH {
        errors.push(format!(
            "Username must not exceed {USERNAME_MAX_LENGTH} characters"
        ));
    }
    if username.is_empty() || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        errors.push("Username can only contain letters, numbers, and underscores".to_string());
    }
    if RESERVED_USERNAMES.contains(&username.to_lowercase().as_str()) {
        errors.push("This username is reserved".to_string());
    }

    Verdict::from_errors(errors)
}

#[must_use]
pub fn validate_email(email: &str) -> Verdict {
    let mut errors = Vec::new();

    let shape_ok = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .is_ok_and(|regex| regex.is_match(email));
    if !shape_ok {
        errors.push("Invalid email format".to_string());
    }

    let domain = email.rsplit('@').next().unwrap_or("").to_lowercase();
    if DISPOSABLE_DOMAINS.contains(&domain.as_str()) {
        errors.push("Disposable email addresses are not allowed".to_string());
    }

    Verdict::from_errors(errors)
}

/// Three repeated characters, or a known sequential run of digits or letters.
fn has_common_pattern(password: &str) -> bool {
    if has_repeated_run(password) {
        return true;
    }
    let lowered = password.to_lowercase();
    SEQUENTIAL_DIGITS
        .iter()
        .chain(SEQUENTIAL_LETTERS.iter())
        .any(|run| lowered.contains(run))
}

fn has_repeated_run(password: &str) -> bool {
    let chars: Vec<char> = password.to_lowercase().chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rejects_common_words() {
        let verdict = validate_password("password");
        assert!(!verdict.valid);
        assert!(verdict
            .errors
            .iter()
            .any(|e| e == "Password is too common"));
    }

    #[test]
    fn password_requires_symbol() {
        let verdict = validate_password("Password123");
        assert!(!verdict.valid);
        assert!(verdict
            .errors
            .iter()
            .any(|e| e.contains("special character")));
    }

    #[test]
    fn password_enforces_min_length() {
        let verdict = validate_password("short1!");
        assert!(!verdict.valid);
        assert!(verdict
            .errors
            .iter()
            .any(|e| e.contains("at least 8 characters")));
    }

    #[test]
    fn password_accepts_strong_value() {
        let verdict = validate_password("Str0ng!Pass99");
        assert!(verdict.valid, "unexpected errors: {:?}", verdict.errors);
    }

    #[test]
    fn password_rejects_repeats_and_sequences() {
        assert!(validate_password("Aaa1!bcdXkz")
            .errors
            .iter()
            .any(|e| e.contains("common patterns")));
        assert!(validate_password("Xk9!mn123qr")
            .errors
            .iter()
            .any(|e| e.contains("common patterns")));
    }

    #[test]
    fn password_collects_every_violation() {
        // Too short, no uppercase, no digit, no symbol.
        let verdict = validate_password("abdfgi");
        assert!(verdict.errors.len() >= 4);
    }

    #[test]
    fn strength_score_orders_sensibly() {
        let weak = strength_score("aaaaaaaa");
        let strong = strength_score("Str0ng!Pass99");
        assert!(strong > weak);
        assert!(strong <= 100);
    }

    #[test]
    fn strength_score_is_advisory_floor_and_ceiling() {
        assert_eq!(strength_score(""), 0);
        assert!(strength_score("X9$kLm2!pQ7@wE4#rT6^yU1&") >= 90);
    }

    #[test]
    fn username_rejects_reserved_and_short() {
        assert!(validate_username("admin")
            .errors
            .iter()
            .any(|e| e.contains("reserved")));
        assert!(validate_username("Admin")
            .errors
            .iter()
            .any(|e| e.contains("reserved")));
        assert!(validate_username("ab")
            .errors
            .iter()
            .any(|e| e.contains("at least 3 characters")));
    }

    #[test]
    fn username_accepts_valid_value() {
        let verdict = validate_username("valid_user1");
        assert!(verdict.valid, "unexpected errors: {:?}", verdict.errors);
    }

    #[test]
    fn username_rejects_bad_charset() {
        assert!(!validate_username("no-dashes").valid);
        assert!(!validate_username("no spaces").valid);
    }

    #[test]
    fn email_shape_and_blocklist() {
        assert!(validate_email("a@example.com").valid);
        assert!(!validate_email("not-an-email").valid);
        assert!(!validate_email("missing-tld@example").valid);
        let verdict = validate_email("user@mailinator.com");
        assert!(verdict
            .errors
            .iter()
            .any(|e| e.contains("Disposable")));
    }
}
