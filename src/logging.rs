//! File logging for diagnostics.
//!
//! Stdout belongs to the user-facing messages, so log lines only go to
//! rotating files under `<data_dir>/logs`.

use std::path::{Path, PathBuf};

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;

const LOG_FILE_BASENAME: &str = "timetrack";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Starts the file logger. The returned handle must stay alive for the rest
/// of the process.
///
/// # Errors
/// - Returns an error when `level` is not a valid log specification.
/// - Returns an error when the log directory cannot be created or the backend
///   fails to start.
pub fn init_logging(level: &str, data_dir: &Path) -> Result<LoggerHandle, String> {
    let dir = log_dir(data_dir);
    std::fs::create_dir_all(&dir)
        .map_err(|err| format!("failed to create log directory `{}`: {err}", dir.display()))?;

    let handle = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?
        .log_to_file(
            FileSpec::default()
                .directory(dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::Direct)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    info!(
        "event=app_start status=ok version={} level={level} data_dir={}",
        env!("CARGO_PKG_VERSION"),
        data_dir.display()
    );
    Ok(handle)
}
