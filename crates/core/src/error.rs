//! Service error model.

use thiserror::Error;

/// Result type returned by every synchronous service operation.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure kinds surfaced to callers of the auth and ingestion services.
///
/// The HTTP layer maps these to status codes; nothing below it should need a
/// richer error to decide what to tell the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is not legal in the current state (e.g. illegal transition).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Bad credentials, or an invalid/expired/reused/blacklisted token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request conflicts with existing state (e.g. duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else (persistence, signing, hashing failures).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
