mod config;
pub mod database;
pub mod store;

pub use config::Config;
pub use database::Database;
pub use store::{JourneyRecord, MemoryStore, ProgressionStore, TaskSource};

use std::path::PathBuf;

/// Returns the data directory.
///
/// `TRAILHEAD_DATA_DIR` overrides everything; otherwise
/// `~/.config/trailhead[-dev]/` based on TRAILHEAD_ENV.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("TRAILHEAD_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TRAILHEAD_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("trailhead-dev")
            } else {
                base_dir.join("trailhead")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
