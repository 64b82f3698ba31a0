//! Signed bearer tokens.
//!
//! A token is `user_id.role.expiry.signature`: expiry in Unix seconds and a
//! BLAKE3 keyed hash over the first three fields.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Role, User};

const KEY_CONTEXT: &str = "bloodbank 2024-01 token signing key";

/// What a verified token asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Claims {
    /// Account the token was issued to.
    pub user_id: i64,
    /// Role at issue time.
    pub role: Role,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies tokens with one signing key.
#[derive(Clone)]
pub struct TokenSigner {
    key: [u8; 32],
    ttl: TimeDelta,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Create a signer.
    ///
    /// Without a secret a random key is used, so tokens do not survive a restart.
    #[must_use]
    pub fn new(secret: Option<&str>, ttl: std::time::Duration) -> Self {
        let material = match secret {
            Some(secret) => secret.to_string(),
            None => format!("{}{}", Uuid::new_v4(), Uuid::new_v4()),
        };
        Self {
            key: blake3::derive_key(KEY_CONTEXT, material.as_bytes()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::hours(24)),
        }
    }

    fn sign(&self, payload: &str) -> blake3::Hash {
        blake3::keyed_hash(&self.key, payload.as_bytes())
    }

    /// Issue a token for `user`.
    #[must_use]
    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> String {
        let expires_at = now + self.ttl;
        let payload = format!("{}.{}.{}", user.id, user.role, expires_at.timestamp());
        format!("{payload}.{}", self.sign(&payload).to_hex())
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for malformed, forged or expired tokens.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let malformed = || Error::unauthorized("malformed token");

        let (payload, signature) = token.rsplit_once('.').ok_or_else(malformed)?;
        let signature = blake3::Hash::from_hex(signature).map_err(|_| malformed())?;
        if self.sign(payload) != signature {
            return Err(Error::unauthorized("invalid token signature"));
        }

        let mut parts = payload.splitn(3, '.');
        let (Some(id), Some(role), Some(expiry)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        let user_id: i64 = id.parse().map_err(|_| malformed())?;
        let role: Role = role.parse().map_err(|_| malformed())?;
        let expires_at = expiry
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(malformed)?;

        if now >= expires_at {
            return Err(Error::unauthorized("token expired"));
        }

        Ok(Claims {
            user_id,
            role,
            expires_at,
        })
    }
}
