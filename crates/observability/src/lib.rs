//! Tracing and logging setup shared by delayq binaries.

/// Initialize process-wide logging from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing subscriber configuration (format, filters).
pub mod tracing;

pub use self::tracing::{init_with, LogFormat, LogFormatError, ENV_LOG_FORMAT};
