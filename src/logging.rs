//! Process-wide tracing setup: stdout plus a daily log file under the data dir.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::AppPaths;

const LOG_FILE_PREFIX: &str = "docqa.log";
const DEFAULT_FILTER: &str = "info,tower_http=warn";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Only the first call takes effect; later calls are ignored.
pub fn init(paths: &AppPaths) {
    let file_layer = file_writer(&paths.log_dir).map(|writer| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Non-blocking writer for the rolling log file, `None` when the log
/// directory cannot be created (stdout logging still works).
fn file_writer(log_dir: &Path) -> Option<NonBlocking> {
    if LOG_GUARD.get().is_some() {
        return None;
    }
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("Logging to stdout only, cannot create {}: {}", log_dir.display(), err);
        return None;
    }

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_data_dir(tmp.path().to_path_buf(), tmp.path().join("data"));

        init(&paths);
        init(&paths);

        assert!(paths.log_dir.is_dir());
        assert!(LOG_GUARD.get().is_some());
    }
}
