// SPDX-License-Identifier: GPL-3.0-only

//! Console and file logging control
//!
//! Logging defaults to off; applications opt in with [`set_log_status`].
//! Set RUST_LOG to control the log level, e.g. RUST_LOG=tofcam=debug.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Enable or disable console printing and log file writing
///
/// Installs the global tracing subscriber on first call; later calls are
/// no-ops because the global subscriber cannot be replaced. Log files are
/// written under the user data directory as tofcam_YYYYMMDD_HHMMSS.log.
pub fn set_log_status(console: bool, log_file: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = console.then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    let file_layer = log_file.then(open_log_file).flatten().map(|file| {
        fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(Arc::new(file))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// Create the timestamped log file, returning None if the directory or
/// file cannot be created (logging must never take the session down)
fn open_log_file() -> Option<File> {
    let dir = log_dir()?;
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("tofcam: cannot create log directory {}: {}", dir.display(), e);
        return None;
    }
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("tofcam_{}.log", stamp));
    match File::create(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("tofcam: cannot create log file {}: {}", path.display(), e);
            None
        }
    }
}

/// Log directory under the platform data dir
pub fn log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tofcam").join("logs"))
}
