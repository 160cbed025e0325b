use std::{
    env,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing_subscriber::EnvFilter;

use crate::LOG_FILTER_ENV;

pub fn resolve_desktop_log_path(app_root_dir: Option<PathBuf>, file_name: &str) -> PathBuf {
    match app_root_dir {
        Some(root) => root.join("logs").join(file_name),
        None => env::temp_dir().join(file_name),
    }
}

/// Installs the process-wide subscriber. Call once, before the runtime starts.
pub fn init_desktop_logging(log_path: &Path) -> Result<(), String> {
    if let Some(parent_dir) = log_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|error| {
            format!(
                "Failed to create log directory {}: {}",
                parent_dir.display(),
                error
            )
        })?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|error| format!("Failed to open log {}: {}", log_path.display(), error))?;

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init()
        .map_err(|error| format!("Failed to install log subscriber: {error}"))
}

pub fn append_startup_log(message: &str) {
    tracing::info!(target: "startup", "{message}");
}

pub fn append_desktop_log(message: &str) {
    tracing::info!(target: "desktop", "{message}");
}
