//! Logging setup shared by the binary and integration harnesses

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{Error, Result};

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Install a console layer plus a daily rolling file layer.
///
/// `RUST_LOG` takes precedence over `log_level` when it is set.
pub fn init_logging(
    log_dir: impl AsRef<Path>,
    name: &str,
    log_level: &str,
) -> Result<()> {
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        log_dir.as_ref(),
        format!("{}.log", name),
    );

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter(log_level));

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(file_appender)
        .with_filter(env_filter(log_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Install a console-only subscriber writing to stderr
pub fn init_console_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(env_filter(log_level)),
        )
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
