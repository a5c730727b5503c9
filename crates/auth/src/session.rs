//! Auth Session Manager: issue, rotate, and revoke credential pairs.
//!
//! Access tokens are short-lived signed credentials; refresh tokens are opaque
//! single-use values persisted in a [`RefreshTokenStore`]. Every successful
//! refresh consumes (revokes) the token presented and issues a new pair.
//! Logout blacklists the access token and tears down every live refresh token
//! of its subject.

use std::sync::{Arc, OnceLock};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use docvault_core::{ServiceError, ServiceResult, UserId};

use crate::blacklist::AccessTokenBlacklist;
use crate::claims::AccessClaims;
use crate::password::PasswordHasher;
use crate::refresh_token::{NewRefreshToken, RefreshToken, generate_token_value};
use crate::signer::TokenSigner;
use crate::store::{RefreshTokenStore, UserStore};
use crate::user::{NewUser, User, UserSummary};
use crate::Role;

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Hashed once and verified against on unknown emails, so that both login
/// failure paths pay for a hash comparison.
const DUMMY_PASSWORD: &str = "docvault-dummy-password";

/// Token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::hours(1),
            refresh_token_ttl: Duration::days(7),
        }
    }
}

/// Registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Freshly issued credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of login, registration, and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

impl AuthResponse {
    fn new(tokens: TokenPair, user: &User) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: UserSummary::from(user),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Issues and revokes sessions.
///
/// All collaborators are injected so that tests get isolated stores and an
/// isolated blacklist.
pub struct AuthSessionManager {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    signer: Arc<dyn TokenSigner>,
    hasher: Arc<dyn PasswordHasher>,
    blacklist: Arc<dyn AccessTokenBlacklist>,
    config: SessionConfig,
    dummy_digest: OnceLock<String>,
}

impl AuthSessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        signer: Arc<dyn TokenSigner>,
        hasher: Arc<dyn PasswordHasher>,
        blacklist: Arc<dyn AccessTokenBlacklist>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            signer,
            hasher,
            blacklist,
            config: SessionConfig::default(),
            dummy_digest: OnceLock::new(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Authenticate with email and password.
    pub fn login(&self, email: &str, password: &str) -> ServiceResult<AuthResponse> {
        let Some(user) = self.users.find_by_email(email)? else {
            debug!("login attempt for unknown email");
            let digest = self
                .dummy_digest
                .get_or_init(|| self.hasher.hash(DUMMY_PASSWORD).unwrap_or_default());
            let _ = self.hasher.verify(password, digest);
            return Err(ServiceError::unauthorized(INVALID_CREDENTIALS));
        };

        if !self.hasher.verify(password, &user.password_hash) {
            warn!(user_id = %user.id, "login rejected: password mismatch");
            return Err(ServiceError::unauthorized(INVALID_CREDENTIALS));
        }

        let tokens = self.issue(&user)?;
        info!(user_id = %user.id, "user logged in");
        Ok(AuthResponse::new(tokens, &user))
    }

    /// Create an account with the default role and log it in.
    pub fn register(&self, request: RegisterUser) -> ServiceResult<AuthResponse> {
        if self.users.find_by_email(&request.email)?.is_some() {
            return Err(ServiceError::conflict("email already registered"));
        }

        let password_hash = self
            .hasher
            .hash(&request.password)
            .map_err(|e| ServiceError::internal(e.to_string()))?;

        let user = self.users.create(NewUser {
            name: request.name,
            email: request.email,
            password_hash,
            role: Role::USER,
        })?;

        let tokens = self.issue(&user)?;
        info!(user_id = %user.id, "user registered");
        Ok(AuthResponse::new(tokens, &user))
    }

    /// Exchange a refresh token for a new pair (single-use rotation).
    ///
    /// An expired token is revoked as a side effect before the call fails.
    pub fn refresh(&self, refresh_token: &str) -> ServiceResult<AuthResponse> {
        let now = Utc::now();

        let Some(mut stored) = self.refresh_tokens.find_by_value(refresh_token)? else {
            return Err(ServiceError::unauthorized("invalid refresh token"));
        };

        if stored.is_revoked {
            warn!(user_id = %stored.user_id, token_id = %stored.id, "revoked refresh token presented");
            return Err(ServiceError::unauthorized("invalid refresh token"));
        }

        if stored.is_expired_at(now) {
            stored.revoke();
            self.refresh_tokens.save(&stored)?;
            info!(user_id = %stored.user_id, token_id = %stored.id, "expired refresh token revoked");
            return Err(ServiceError::unauthorized("refresh token expired"));
        }

        let Some(user) = self.users.find_by_id(stored.user_id)? else {
            warn!(user_id = %stored.user_id, "refresh token owner no longer exists");
            return Err(ServiceError::unauthorized("invalid refresh token"));
        };

        let tokens = self.issue(&user)?;

        stored.revoke();
        self.refresh_tokens.save(&stored)?;

        debug!(user_id = %user.id, consumed = %stored.id, "refresh token rotated");
        Ok(AuthResponse::new(tokens, &user))
    }

    /// Blacklist the access token and revoke all live refresh tokens of its
    /// subject. Never fails: an undecodable token is only blacklisted.
    pub fn logout(&self, access_token: &str) -> LogoutResponse {
        self.blacklist.insert(access_token);

        match self.signer.verify(access_token, Utc::now()) {
            Ok(claims) => self.revoke_all(claims.sub),
            Err(err) => {
                debug!(error = %err, "logout token not decodable; skipping session teardown");
            }
        }

        LogoutResponse {
            message: "logged out successfully".to_string(),
        }
    }

    pub fn is_blacklisted(&self, access_token: &str) -> bool {
        self.blacklist.contains(access_token)
    }

    /// Resolve the claims of an access token presented on a protected call.
    pub fn authenticate(&self, access_token: &str) -> ServiceResult<AccessClaims> {
        if self.is_blacklisted(access_token) {
            return Err(ServiceError::unauthorized("token has been revoked"));
        }

        self.signer
            .verify(access_token, Utc::now())
            .map_err(|e| ServiceError::unauthorized(e.to_string()))
    }

    /// Refresh tokens of `user_id` that could still be exchanged.
    pub fn active_sessions(&self, user_id: UserId) -> ServiceResult<Vec<RefreshToken>> {
        let now = Utc::now();
        let tokens = self.refresh_tokens.list_active(user_id)?;
        Ok(tokens.into_iter().filter(|t| t.is_usable_at(now)).collect())
    }

    fn revoke_all(&self, user_id: UserId) {
        let tokens = match self.refresh_tokens.list_active(user_id) {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "failed to list refresh tokens at logout");
                return;
            }
        };

        let mut revoked = 0usize;
        for mut token in tokens {
            token.revoke();
            match self.refresh_tokens.save(&token) {
                Ok(_) => revoked += 1,
                Err(err) => {
                    warn!(user_id = %user_id, token_id = %token.id, error = %err, "failed to revoke refresh token");
                }
            }
        }

        info!(user_id = %user_id, revoked, "sessions revoked at logout");
    }

    fn issue(&self, user: &User) -> ServiceResult<TokenPair> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.config.refresh_token_ttl)
            .ok_or_else(|| ServiceError::internal("refresh token lifetime out of range"))?;

        let claims = AccessClaims::new(
            user.id,
            user.email.clone(),
            user.role.clone(),
            now,
            self.config.access_token_ttl,
        );
        let access_token = self
            .signer
            .sign(&claims)
            .map_err(|e| ServiceError::internal(e.to_string()))?;

        let refresh = self.refresh_tokens.create(NewRefreshToken {
            token: generate_token_value(),
            user_id: user.id,
            expires_at,
        })?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
        })
    }
}
