//! Logging setup for batch runs.
//!
//! Diagnostics go to stderr so command output stays clean. When
//! `PHOTOTRAIL_LOG_DIR` is set, a daily-rolling file log is written there as
//! well, which keeps long embed/apply batches reviewable after the fact.
//!
//! Log level comes from the `PHOTOTRAIL_LOG` environment variable
//! (`trace`..`error`); `--verbose` raises the default from `info` to `debug`.

use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_env("PHOTOTRAIL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    if let Ok(dir) = std::env::var("PHOTOTRAIL_LOG_DIR") {
        let log_dir = PathBuf::from(dir);
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "phototrail.log");
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

        // Store the guard in a static to prevent it from being dropped
        // This is safe because we only call init() once at startup
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(_guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();

        tracing::info!("logging to stderr and {:?}", log_dir);
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();

    Ok(())
}
