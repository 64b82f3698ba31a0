//! Salted, iterated BLAKE3 password hashes.
//!
//! Stored form is `salt$digest`, both lowercase hex-ish text. The salt is a
//! random UUID; the digest is a derived key re-hashed [`ROUNDS`] times.

use uuid::Uuid;

use crate::error::{Error, Result};

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Key-derivation context string.
const CONTEXT: &str = "bloodbank 2024-01 password hash";

const ROUNDS: u32 = 10_000;

fn digest(salt: &str, password: &str) -> blake3::Hash {
    let mut material = Vec::with_capacity(salt.len() + password.len());
    material.extend_from_slice(salt.as_bytes());
    material.extend_from_slice(password.as_bytes());

    let mut key = blake3::derive_key(CONTEXT, &material);
    for _ in 0..ROUNDS {
        key = *blake3::keyed_hash(&key, salt.as_bytes()).as_bytes();
    }
    blake3::Hash::from(key)
}

/// Hash a password for storage.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the password is shorter than
/// [`MIN_PASSWORD_LEN`] characters.
pub fn hash_password(password: &str) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let salt = Uuid::new_v4().simple().to_string();
    Ok(format!("{salt}${}", digest(&salt, password).to_hex()))
}

/// Check a password against a stored hash.
///
/// Malformed stored hashes never verify.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(expected) = blake3::Hash::from_hex(hex) else {
        return false;
    };
    // blake3::Hash equality is constant-time
    digest(salt, password) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("correct horsf", &stored));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("password123").unwrap();
        let b = hash_password("password123").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("password123", &a));
        assert!(verify_password("password123", &b));
    }

    #[test]
    fn test_short_password_rejected() {
        let err = hash_password("short").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "no-separator"));
        assert!(!verify_password("anything", "salt$not-hex"));
    }
}
