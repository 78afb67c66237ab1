use crate::config::AppConfig;
use crate::data_structures::{SharedTable, TableSource};
use crate::dataset;
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReloadOutcome {
    /// Fallback file does not exist (or cannot be stated).
    Missing,
    /// File mtime has not advanced since the last observation.
    Unchanged,
    /// An uploaded dataset is active and pins the table until restart.
    Pinned,
    Reloaded,
    Failed,
}

/// Background reload loop for the fallback dataset file.
///
/// Polls the file's mtime on the configured interval and swaps the shared
/// table when it changes. An uploaded dataset pins the table until restart;
/// a failed reload logs and keeps the previous table.
#[instrument(skip(table, config), fields(dataset_path = %config.dataset_path))]
pub async fn run(table: SharedTable, config: AppConfig) {
    if config.reload_interval.is_zero() {
        info!("Dataset reload worker disabled by configuration");
        return;
    }

    info!(interval = ?config.reload_interval, "Starting dataset reload worker");

    let mut last_modified = file_mtime(&config.dataset_path);
    let mut iteration_count = 0u64;

    loop {
        tokio::time::sleep(config.reload_interval).await;
        iteration_count += 1;

        let outcome = check_and_reload(&table, &config.dataset_path, &mut last_modified).await;
        debug!(iteration = iteration_count, ?outcome, "Checked fallback dataset file");
    }
}

/// One poll of the fallback file: stat it, skip unchanged or pinned tables,
/// otherwise swap in the freshly parsed dataset.
pub(crate) async fn check_and_reload(
    table: &SharedTable,
    path: &str,
    last_modified: &mut Option<SystemTime>,
) -> ReloadOutcome {
    let Some(modified) = file_mtime(path) else {
        return ReloadOutcome::Missing;
    };

    if last_modified.is_some_and(|prev| modified <= prev) {
        return ReloadOutcome::Unchanged;
    }

    {
        let table_guard = table.lock().await;
        if table_guard.source == TableSource::Upload {
            debug!("Uploaded dataset is active, skipping fallback reload");
            *last_modified = Some(modified);
            return ReloadOutcome::Pinned;
        }
    }

    match dataset::load_from_path(path) {
        Ok(new_table) => {
            let rows = new_table.rows.len();
            let mut table_guard = table.lock().await;
            *table_guard = new_table;
            *last_modified = Some(modified);
            info!(rows, "Reloaded fallback dataset");
            ReloadOutcome::Reloaded
        }
        Err(e) => {
            error!(error = %e, "Failed to reload fallback dataset, keeping previous table");
            *last_modified = Some(modified);
            ReloadOutcome::Failed
        }
    }
}

fn file_mtime(path: impl AsRef<Path>) -> Option<SystemTime> {
    match fs::metadata(path.as_ref()) {
        Ok(metadata) => metadata.modified().ok(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.as_ref().display(), error = %e, "Failed to stat dataset file");
            None
        }
    }
}
