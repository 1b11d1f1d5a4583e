//! Tracing/logging setup shared by the binaries and black-box tests.

pub mod subscriber;

pub use subscriber::LogFormat;

/// Initialize process-wide tracing, with the format taken from `LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .map(|v| LogFormat::parse(&v))
        .unwrap_or_default();
    subscriber::init(format);
}
