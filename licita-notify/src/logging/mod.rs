//! Logging setup with a reloadable filter and optional daily log files.
//!
//! Console output always uses local-timezone timestamps. When a log
//! directory is configured, a second layer writes to a daily-rolling file
//! and a background task prunes files older than the retention period.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "licita_notify=info,notify_template=info";

/// Rolled files are named `<prefix>.YYYY-MM-DD`.
const LOG_FILE_PREFIX: &str = "licita-notify.log";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive. `RUST_LOG` wins when set.
    pub filter: String,
    /// Write daily-rolling log files here when set.
    pub directory: Option<PathBuf>,
    pub retention_days: u32,
    /// JSON lines on the console instead of text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
            retention_days: 7,
            json: false,
        }
    }
}

/// Formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Runtime control over the installed subscriber.
pub struct LoggingHandle {
    handle: FilterHandle,
    log_dir: Option<PathBuf>,
    retention_days: u32,
}

impl LoggingHandle {
    fn new(handle: FilterHandle, log_dir: Option<PathBuf>, retention_days: u32) -> Self {
        Self {
            handle,
            log_dir,
            retention_days,
        }
    }

    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the filter directive, e.g. `licita_notify=debug`.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| Error::config(format!("Invalid filter directive: {e}")))?;
        self.handle
            .reload(filter)
            .map_err(|e| Error::config(format!("Failed to reload filter: {e}")))?;

        info!(directive, "Log filter updated");
        Ok(())
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// Prune old log files now and then daily until `cancel_token` fires.
    /// Does nothing without a log directory.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let Some(log_dir) = self.log_dir.clone() else {
            return;
        };
        let retention_days = self.retention_days;

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);
            loop {
                if let Err(e) = cleanup_old_logs(&log_dir, retention_days, Utc::now()).await {
                    warn!(error = %e, "Failed to clean up old logs");
                }
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {}
                }
            }
        });
    }
}

/// Delete rolled log files dated more than `retention_days` before `now`.
async fn cleanup_old_logs(log_dir: &Path, retention_days: u32, now: DateTime<Utc>) -> std::io::Result<usize> {
    let cutoff = (now - chrono::Duration::days(i64::from(retention_days))).date_naive();
    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(LOG_FILE_PREFIX))
            .and_then(|n| n.strip_prefix('.'))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };

        if date < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old log file"),
            }
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Cleaned up old log files");
    }
    Ok(deleted)
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process, or buffered
/// file output is lost.
pub fn init_logging(settings: &LoggingSettings) -> Result<(Arc<LoggingHandle>, Option<WorkerGuard>)> {
    let initial_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)
            .map_err(|e| Error::config(format!("Invalid log filter {:?}: {e}", settings.filter)))?,
    };
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let text_console = (!settings.json).then(|| fmt::layer().with_ansi(true).with_timer(LocalTimer));
    let json_console = settings.json.then(|| fmt::layer().json().with_timer(LocalTimer));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(text_console)
        .with(json_console)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {e}")))?;

    let handle = Arc::new(LoggingHandle::new(
        filter_handle,
        settings.directory.clone(),
        settings.retention_days,
    ));
    Ok((handle, guard))
}
