//! Process-wide tracing setup.
//!
//! Logs go to stderr and to a daily-rolling file under `<home>/logs/`.
//! `RUST_LOG` filters both; the default level is `info`.

use crate::runtime::layout::FilesystemLayout;
use guestprep_shared::errors::GuestprepResult;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps the file writer flushing for the life of the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "guestprep.log";

/// Install the global subscriber for `layout`. Later calls are no-ops.
pub fn init_logging_for(layout: &FilesystemLayout) -> GuestprepResult<()> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(layout.logs_dir())?;
    let file_appender = tracing_appender::rolling::daily(layout.logs_dir(), LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init();

    // Another subscriber (e.g. a test harness) may already be global.
    if installed.is_ok() {
        let _ = FILE_GUARD.set(guard);
    }
    Ok(())
}
