//! Runtime settings
//!
//! Everything is read from environment variables at startup.

use std::path::PathBuf;

/// Default number of pooled SQLite connections
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Settings shared by the server and the maintenance binaries
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub pool_size: u32,
}

impl Settings {
    /// Load settings from `FICHAPRO_DATABASE_PATH` and `FICHAPRO_POOL_SIZE`
    pub fn from_env() -> Self {
        let pool_size = std::env::var("FICHAPRO_POOL_SIZE")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_POOL_SIZE);

        Self {
            database_path: database_path(),
            pool_size,
        }
    }
}

/// Get the database path from environment or use `<project>/data/fichapro.db`
pub fn database_path() -> PathBuf {
    std::env::var("FICHAPRO_DATABASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let mut path = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()))
                .unwrap_or_else(|| PathBuf::from("."));

            // Go up from target/release or target/debug to project root
            if path.ends_with("release") || path.ends_with("debug") {
                if let Some(grandparent) = path.parent().and_then(|p| p.parent()) {
                    path = grandparent.to_path_buf();
                }
            }

            path.push("data");
            path.push("fichapro.db");
            path
        })
}
