//! Data-directory resolution for the durable log.
//!
//! The engine takes explicit paths everywhere; this module only supplies
//! the default location used by
//! [`FileBackedStore::open_default`](crate::storage::file_log::FileBackedStore::open_default):
//!
//! - `LOGBOOK_DATA_DIR` environment variable, when set and non-blank
//! - otherwise the platform data directory (e.g. `~/.local/share/logbook`)

use std::env;
use std::io;
use std::path::PathBuf;

use crate::{Error, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LOGBOOK_DATA_DIR";

/// File name of the durable log inside the data directory.
const LOG_FILE_NAME: &str = "tasks.csv";

/// Resolve the directory holding Logbook data.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let base = dirs::data_dir().ok_or_else(|| {
        Error::Persistence(io::Error::new(
            io::ErrorKind::NotFound,
            "Could not determine a data directory for this platform",
        ))
    })?;

    Ok(base.join("logbook"))
}

/// Resolve the default durable-log path.
pub fn default_log_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(LOG_FILE_NAME))
}
