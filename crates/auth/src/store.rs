//! Persistence ports for users and refresh tokens, with in-memory adapters.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;

use docvault_core::{RefreshTokenId, ServiceError, UserId};

use crate::refresh_token::{NewRefreshToken, RefreshToken};
use crate::user::{NewUser, User};

/// User persistence (CRUD lives elsewhere; this is what auth needs).
pub trait UserStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError>;

    fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserStoreError>;

    fn create(&self, user: NewUser) -> Result<User, UserStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UserStoreError {
    #[error("email already registered: {0}")]
    DuplicateEmail(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<UserStoreError> for ServiceError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::DuplicateEmail(_) => ServiceError::conflict("email already registered"),
            UserStoreError::Storage(msg) => ServiceError::internal(msg),
        }
    }
}

/// Query over a user's refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTokenFilter {
    pub user_id: UserId,
    /// `None` matches both revoked and live tokens.
    pub is_revoked: Option<bool>,
}

impl RefreshTokenFilter {
    /// Tokens owned by `user_id` that have not been revoked.
    pub fn active(user_id: UserId) -> Self {
        Self {
            user_id,
            is_revoked: Some(false),
        }
    }

    pub fn matches(&self, token: &RefreshToken) -> bool {
        token.user_id == self.user_id && self.is_revoked.is_none_or(|r| token.is_revoked == r)
    }
}

/// Refresh token persistence.
pub trait RefreshTokenStore: Send + Sync {
    fn create(&self, token: NewRefreshToken) -> Result<RefreshToken, TokenStoreError>;

    fn find_by_value(&self, value: &str) -> Result<Option<RefreshToken>, TokenStoreError>;

    /// Matching tokens, oldest first.
    fn find_many(&self, filter: &RefreshTokenFilter) -> Result<Vec<RefreshToken>, TokenStoreError>;

    /// Upsert by id.
    fn save(&self, token: &RefreshToken) -> Result<RefreshToken, TokenStoreError>;

    /// Non-revoked tokens belonging to `user_id`.
    fn list_active(&self, user_id: UserId) -> Result<Vec<RefreshToken>, TokenStoreError> {
        self.find_many(&RefreshTokenFilter::active(user_id))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenStoreError {
    #[error("refresh token value collision")]
    DuplicateValue,
    #[error("refresh token {0} is revoked and cannot be reinstated")]
    RevocationReverted(RefreshTokenId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<TokenStoreError> for ServiceError {
    fn from(err: TokenStoreError) -> Self {
        ServiceError::internal(err.to_string())
    }
}

/// In-memory user store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for InMemoryUserStore {
    fn find_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserStoreError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(&id).cloned())
    }

    fn create(&self, user: NewUser) -> Result<User, UserStoreError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.values().any(|u| u.email == user.email) {
            return Err(UserStoreError::DuplicateEmail(user.email));
        }

        let user = User {
            id: UserId::new(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[derive(Debug, Default)]
struct TokenTable {
    by_id: HashMap<RefreshTokenId, RefreshToken>,
    by_value: HashMap<String, RefreshTokenId>,
}

/// In-memory refresh token store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    inner: RwLock<TokenTable>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefreshTokenStore for InMemoryRefreshTokenStore {
    fn create(&self, token: NewRefreshToken) -> Result<RefreshToken, TokenStoreError> {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if table.by_value.contains_key(&token.token) {
            return Err(TokenStoreError::DuplicateValue);
        }

        let record = RefreshToken {
            id: RefreshTokenId::new(),
            token: token.token,
            user_id: token.user_id,
            is_revoked: false,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        table.by_value.insert(record.token.clone(), record.id);
        table.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    fn find_by_value(&self, value: &str) -> Result<Option<RefreshToken>, TokenStoreError> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table
            .by_value
            .get(value)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    fn find_many(&self, filter: &RefreshTokenFilter) -> Result<Vec<RefreshToken>, TokenStoreError> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut result: Vec<_> = table
            .by_id
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        result.sort_by_key(|t| t.created_at);
        Ok(result)
    }

    fn save(&self, token: &RefreshToken) -> Result<RefreshToken, TokenStoreError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Reborrow through the guard once so `by_id` and `by_value` borrow independently.
        let table = &mut *guard;
        if let Some(existing) = table.by_id.get(&token.id) {
            if existing.is_revoked && !token.is_revoked {
                return Err(TokenStoreError::RevocationReverted(token.id));
            }
            if existing.token != token.token {
                table.by_value.remove(&existing.token);
            }
        }
        table.by_value.insert(token.token.clone(), token.id);
        table.by_id.insert(token.id, token.clone());
        Ok(token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::Role;
    use crate::refresh_token::generate_token_value;

    fn new_token(user_id: UserId) -> NewRefreshToken {
        NewRefreshToken {
            token: generate_token_value(),
            user_id,
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[test]
    fn user_emails_are_unique() {
        let store = InMemoryUserStore::new();
        let new_user = NewUser {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "h".to_string(),
            role: Role::USER,
        };

        let created = store.create(new_user.clone()).unwrap();
        assert_eq!(store.find_by_id(created.id).unwrap(), Some(created.clone()));
        assert_eq!(store.find_by_email("ada@example.com").unwrap(), Some(created));
        assert!(matches!(
            store.create(new_user),
            Err(UserStoreError::DuplicateEmail(_))
        ));
    }

    #[test]
    fn create_find_and_filter_tokens() {
        let store = InMemoryRefreshTokenStore::new();
        let owner = UserId::new();

        let a = store.create(new_token(owner)).unwrap();
        let mut b = store.create(new_token(owner)).unwrap();
        store.create(new_token(UserId::new())).unwrap();

        assert_eq!(store.find_by_value(&a.token).unwrap(), Some(a.clone()));
        assert!(store.find_by_value("missing").unwrap().is_none());

        b.revoke();
        store.save(&b).unwrap();

        let active = store.list_active(owner).unwrap();
        assert_eq!(active, vec![a]);

        let all = store
            .find_many(&RefreshTokenFilter {
                user_id: owner,
                is_revoked: None,
            })
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn revocation_cannot_be_reverted() {
        let store = InMemoryRefreshTokenStore::new();
        let mut token = store.create(new_token(UserId::new())).unwrap();

        token.revoke();
        store.save(&token).unwrap();

        token.is_revoked = false;
        assert!(matches!(
            store.save(&token),
            Err(TokenStoreError::RevocationReverted(_))
        ));
        assert!(store.find_by_value(&token.token).unwrap().unwrap().is_revoked);
    }

    #[test]
    fn save_reindexes_a_changed_value() {
        let store = InMemoryRefreshTokenStore::new();
        let mut token = store.create(new_token(UserId::new())).unwrap();
        let old_value = token.token.clone();

        token.token = generate_token_value();
        store.save(&token).unwrap();

        assert!(store.find_by_value(&old_value).unwrap().is_none());
        assert_eq!(store.find_by_value(&token.token).unwrap(), Some(token.clone()));
    }
}
