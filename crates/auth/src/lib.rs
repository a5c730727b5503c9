//! `docvault-auth`: authentication token lifecycle.
//!
//! Login/registration, single-use refresh token rotation, and access token
//! revocation. Decoupled from HTTP; storage is reached through the ports in
//! [`store`].

pub mod blacklist;
pub mod claims;
pub mod password;
pub mod refresh_token;
pub mod roles;
pub mod session;
pub mod signer;
pub mod store;
pub mod user;

pub use blacklist::{AccessTokenBlacklist, InMemoryBlacklist};
pub use claims::{AccessClaims, TokenValidationError, validate_claims};
pub use password::{Argon2PasswordHasher, PasswordHashError, PasswordHasher};
pub use refresh_token::{NewRefreshToken, RefreshToken, generate_token_value};
pub use roles::Role;
pub use session::{
    AuthResponse, AuthSessionManager, LogoutResponse, RegisterUser, SessionConfig, TokenPair,
};
pub use signer::{Hs256TokenSigner, SignerError, TokenSigner};
pub use store::{
    InMemoryRefreshTokenStore, InMemoryUserStore, RefreshTokenFilter, RefreshTokenStore,
    TokenStoreError, UserStore, UserStoreError,
};
pub use user::{NewUser, User, UserSummary};
