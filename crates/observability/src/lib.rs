//! Process-wide logging setup.

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    self::tracing::init(LogFormat::Json);
}

pub use self::tracing::LogFormat;

/// Subscriber configuration (filters, formatting).
pub mod tracing;
