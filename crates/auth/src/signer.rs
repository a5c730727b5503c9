//! Access token signing and verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::claims::{AccessClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("failed to sign token: {0}")]
    Sign(String),

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Signs access claims into an opaque token string and verifies them back.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &AccessClaims) -> Result<String, SignerError>;

    /// Verify signature and time window. Fails on tampered, malformed, or
    /// expired tokens.
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, SignerError>;
}

/// HS256 JWT signer backed by a shared secret.
pub struct Hs256TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = ["exp", "sub"].iter().map(|c| c.to_string()).collect();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256TokenSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner for Hs256TokenSigner {
    fn sign(&self, claims: &AccessClaims) -> Result<String, SignerError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| SignerError::Sign(e.to_string()))
    }

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, SignerError> {
        let claims = decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| SignerError::Invalid(e.to_string()))?
            .claims;
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}
