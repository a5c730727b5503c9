//! `docvault-core`: shared building blocks for the docvault services.
//!
//! This crate contains identifiers and the service error taxonomy only
//! (no storage, no runtime).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{ServiceError, ServiceResult};
pub use id::{DocumentId, JobId, RefreshTokenId, UserId};
