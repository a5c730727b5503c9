//! Refresh token records.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use docvault_core::{Entity, RefreshTokenId, UserId};

/// Number of random bytes behind a refresh token value.
const TOKEN_BYTES: usize = 32;

/// One issued refresh credential.
///
/// # Invariants
/// - `is_revoked` never goes back to `false` once set.
/// - The token is usable only while not revoked and `now <= expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: RefreshTokenId,
    /// Opaque token value handed to the client.
    pub token: String,
    pub user_id: UserId,
    pub is_revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired_at(now)
    }

    /// Mark the token revoked. Idempotent.
    pub fn revoke(&mut self) {
        self.is_revoked = true;
    }
}

impl Entity for RefreshToken {
    type Id = RefreshTokenId;

    fn id(&self) -> RefreshTokenId {
        self.id
    }
}

/// Fields required to persist a freshly issued refresh token.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Generate an unguessable refresh token value (hex encoded).
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
