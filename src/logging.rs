use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "REPAIRDESK_LOG";
pub const DEFAULT_FILTER: &str = "repairdesk=info,sqlx=warn";
const LOG_FILE_PREFIX: &str = "repairdesk.log";

/// Install the global subscriber.
///
/// Human-readable records go to stderr. When `log_dir` is given, JSON records
/// are also appended to a daily rolling file in that directory; the returned
/// guard must be held until shutdown so buffered lines are flushed.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    tracing_log::LogTracer::init().ok();

    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("install global tracing subscriber")?;

    tracing::debug!(target: "repairdesk", event = "logging_ready", file_sink = guard.is_some());
    Ok(guard)
}
