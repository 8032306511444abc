//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide logging, reading `LOG_FORMAT` and `RUST_LOG`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let format = logging::LogFormat::from_env().unwrap_or_default();
    crate::tracing::init_with(format);
}

/// Log output format selection.
pub mod logging;

/// Subscriber installation (filters, formatters).
pub mod tracing;

pub use logging::{LogFormat, LogFormatError};
