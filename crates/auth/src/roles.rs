use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier carried in access tokens.
///
/// Roles are opaque strings at this layer; role checks happen in the request
/// layer. Newly registered users get [`Role::USER`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Default, non-privileged role.
    pub const USER: Role = Role(Cow::Borrowed("user"));

    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::USER
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
