//! Infrastructure layer: configuration and service wiring.

pub mod config;
pub mod services;

pub use config::{AppConfig, ConfigError, ConfigSource, ProcessEnv};
pub use services::{Services, bootstrap};
