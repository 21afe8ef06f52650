//! Where the collector keeps its files
//!
//! Everything lives under one data directory:
//!
//! ```text
//! <data dir>/
//!   config.toml        collector and tracer settings
//!   stepwise.db        run store
//!   logs/stepwise.log  collector log
//! ```

use std::path::PathBuf;
use std::sync::OnceLock;

const DATA_DIR_NAME: &str = ".stepwise";

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Fix the data directory for this process, `~/.stepwise` when `custom_path`
/// is `None`. Only the first call takes effect; call it before opening the
/// run store or reading config.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let requested = custom_path.unwrap_or_else(default_data_dir);
    if let Err(requested) = DATA_DIR.set(requested) {
        tracing::debug!(
            requested = %requested.display(),
            active = %data_dir().display(),
            "Data directory already chosen, keeping it"
        );
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
}

pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// The run store, shared by the collector and in-process publishers
pub fn database_path() -> PathBuf {
    data_dir().join("stepwise.db")
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join("stepwise.log")
}

/// Written from the bundled example on first run
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
