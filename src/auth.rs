//! Authentication Module
//!
//! Provides:
//! - Registration field validation
//! - Salted PBKDF2-HMAC-SHA256 password hashing
//! - Token generation and `Authorization` header parsing

use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use sha2::Sha256;
use tracing::debug;

use crate::config::AuthConfig;

const HASH_ALGORITHM: &str = "pbkdf2_sha256";
const SALT_BYTES: usize = 16;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex is valid")
});

// ============================================================================
// FIELD VALIDATION
// ============================================================================

pub fn validate_username(username: &str, config: &AuthConfig) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("Username may not be blank.".to_string());
    }
    if username.chars().count() > config.username_max_length {
        return Err(format!(
            "Username may not have more than {} characters.",
            config.username_max_length
        ));
    }
    Ok(())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn validate_password(password: &str, config: &AuthConfig) -> Result<(), String> {
    let len = password.chars().count();
    if len < config.password_min_length {
        return Err(format!(
            "Password must have at least {} characters.",
            config.password_min_length
        ));
    }
    if len > config.password_max_length {
        return Err(format!(
            "Password may not have more than {} characters.",
            config.password_max_length
        ));
    }
    Ok(())
}

// ============================================================================
// PASSWORD HASHING
// ============================================================================

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut digest = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations.max(1), &mut digest);
    digest
}

/// Hash a password into `pbkdf2_sha256$<iterations>$<salt_hex>$<digest_hex>`.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let iterations = iterations.max(1);
    let digest = derive(password, &salt, iterations);
    format!(
        "{}${}${}${}",
        HASH_ALGORITHM,
        iterations,
        hex::encode(salt),
        hex::encode(digest)
    )
}

/// Check a password against an encoded hash produced by [`hash_password`].
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let parts: Vec<&str> = encoded.split('$').collect();
    let [algorithm, iterations, salt, expected] = parts.as_slice() else {
        debug!("Malformed password hash");
        return false;
    };
    if *algorithm != HASH_ALGORITHM {
        debug!("Unsupported password hash algorithm: {}", algorithm);
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        hex::decode(salt),
        hex::decode(expected),
    ) else {
        debug!("Undecodable password hash");
        return false;
    };

    let actual = derive(password, &salt, iterations);
    constant_time_eq(&actual, &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// TOKENS
// ============================================================================

/// Generate a random hex token from `bytes` bytes of entropy.
pub fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes.max(1)];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Extract the key from `Token <key>` or `Bearer <key>`.
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, key) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let key = key.trim();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let encoded = hash_password("correct horse", 50);
        assert!(encoded.starts_with("pbkdf2_sha256$50$"));
        assert!(verify_password("correct horse", &encoded));
        assert!(!verify_password("correct horsE", &encoded));
        assert!(!verify_password("", &encoded));
    }

    #[test]
    fn test_password_salted() {
        let a = hash_password("same-password", 10);
        let b = hash_password("same-password", 10);
        assert_ne!(a, b);
        assert!(verify_password("same-password", &a));
        assert!(verify_password("same-password", &b));
    }

    #[test]
    fn test_password_matches_pbkdf2_vector() {
        // RFC 7914 section 11: PBKDF2-HMAC-SHA256("passwd", "salt", 1)
        let digest = derive("passwd", b"salt", 1);
        assert_eq!(
            hex::encode(digest),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );

        let encoded = format!(
            "pbkdf2_sha256$1${}${}",
            hex::encode(b"salt"),
            hex::encode(digest)
        );
        assert!(verify_password("passwd", &encoded));
    }

    #[test]
    fn test_malformed_hash_rejected() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "md5$1$00$00"));
        assert!(!verify_password("pw", "sha256$1$00$00"));
        assert!(!verify_password("pw", "pbkdf2_sha256$x$00$00"));
        assert!(!verify_password("pw", "pbkdf2_sha256$1$zz$00"));
        assert!(!verify_password("pw", "pbkdf2_sha256$1$00"));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("player@example.com"));
        assert!(is_valid_email("first.last+quest@lab.bio.org"));

        assert!(!is_valid_email("player"));
        assert!(!is_valid_email("player@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("player@example"));
        assert!(!is_valid_email("pla yer@example.com"));
    }

    #[test]
    fn test_field_lengths() {
        let config = AuthConfig::default();

        assert!(validate_username("ada", &config).is_ok());
        assert!(validate_username("   ", &config).is_err());
        assert!(validate_username(&"a".repeat(151), &config).is_err());

        assert!(validate_password("12345678", &config).is_ok());
        assert!(validate_password("1234567", &config).is_err());
        assert!(validate_password(&"p".repeat(129), &config).is_err());
    }

    #[test]
    fn test_token_generation() {
        let token = generate_token(20);
        assert_eq!(token.len(), 40);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token(20));
    }

    #[test]
    fn test_authorization_parsing() {
        assert_eq!(parse_authorization("Token abc123"), Some("abc123"));
        assert_eq!(parse_authorization("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_authorization("token   abc123 "), Some("abc123"));

        assert_eq!(parse_authorization("Basic abc123"), None);
        assert_eq!(parse_authorization("Token"), None);
        assert_eq!(parse_authorization("abc123"), None);
        assert_eq!(parse_authorization("Token a b"), None);
    }
}
