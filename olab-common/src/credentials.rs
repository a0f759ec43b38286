//! Password hashing, session tokens and credential rules
//!
//! Passwords are stored as salted SHA-256 (`users.password_hash`,
//! `users.password_salt`). Tokens and salts are random hex strings.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

/// Random 16-byte salt as 32 hex characters
pub fn generate_salt() -> String {
    random_hex(16)
}

/// Random 32-byte opaque session token as 64 hex characters
pub fn generate_token() -> String {
    random_hex(32)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 of salt followed by password, as 64 hex characters
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

/// Trim and sanity-check an e-mail address
pub fn normalize_email(email: &str) -> Result<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("Please enter your email".to_string()));
    }
    if !trimmed.contains('@') {
        return Err(Error::InvalidInput(format!("Invalid email address: {}", trimmed)));
    }
    Ok(trimmed.to_lowercase())
}

/// Rules applied when a password is set
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Rules applied by the change-password form
pub fn validate_password_change(new_password: &str, confirm_password: &str) -> Result<()> {
    if new_password.is_empty() || confirm_password.is_empty() {
        return Err(Error::InvalidInput("Please fill in all fields".to_string()));
    }
    if new_password != confirm_password {
        return Err(Error::InvalidInput("Passwords do not match".to_string()));
    }
    validate_password(new_password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_per_salt() {
        let a = hash_password("hunter22", "salt1");
        assert_eq!(a, hash_password("hunter22", "salt1"));
        assert_ne!(a, hash_password("hunter22", "salt2"));
        assert_eq!(a.len(), 64);
        assert!(verify_password("hunter22", "salt1", &a));
        assert!(!verify_password("hunter23", "salt1", &a));
    }

    #[test]
    fn test_tokens_are_unique_hex() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_eq!(t1.len(), 64);
        assert_ne!(t1, t2);
        assert!(t1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(generate_salt().len(), 32);
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ann@Example.org ").unwrap(), "ann@example.org");
        assert!(normalize_email("   ").is_err());
        assert!(normalize_email("nobody").is_err());
    }

    #[test]
    fn test_password_change_rules() {
        assert!(validate_password_change("", "").is_err());
        assert!(validate_password_change("abcdef", "abcdeg").is_err());
        assert!(validate_password_change("abc", "abc").is_err());
        assert!(validate_password_change("abcdef", "abcdef").is_ok());
    }
}
