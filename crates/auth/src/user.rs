//! User records as seen by the session manager.
//!
//! User CRUD lives outside this crate; only the fields needed to authenticate
//! and to describe the caller are modeled here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docvault_core::{Entity, UserId};

use crate::Role;

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Digest produced by the configured [`PasswordHasher`](crate::PasswordHasher).
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

/// Fields required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Public view of a user returned alongside issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}
