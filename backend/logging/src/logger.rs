//! Structured Logger
//!
//! Wraps `tracing` to provide console output, a daily-rotated JSON file
//! (NDJSON), and environment-based level control.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix for the rolling log, e.g. `plugdeck.log.2026-10-17`.
pub const LOG_FILE_NAME: &str = "plugdeck.log";

/// Initialize the global structured logger.
///
/// `RUST_LOG` wins over `level` when set. Calling this twice is harmless; the
/// second call leaves the first subscriber in place.
pub fn init_logger<P: AsRef<Path>>(log_dir: P, level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);

    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_ansi(false);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
