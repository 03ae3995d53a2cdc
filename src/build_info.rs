//! Build metadata embedded by `build.rs`

use std::fmt;

use serde::Serialize;

use crate::config::Settings;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

const BUILD_NUMBER: Option<&str> = option_env!("FICHAPRO_BUILD_NUMBER");
const BUILD_TIMESTAMP: Option<&str> = option_env!("FICHAPRO_BUILD_TIMESTAMP");
const BUILD_PROFILE: Option<&str> = option_env!("FICHAPRO_BUILD_PROFILE");

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub build_number: u64,
    pub build_timestamp: &'static str,
    /// `debug` or `release`
    pub profile: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            name: NAME,
            version: VERSION,
            build_number: parse_build_number(BUILD_NUMBER),
            build_timestamp: BUILD_TIMESTAMP.unwrap_or("unknown"),
            profile: BUILD_PROFILE.unwrap_or("unknown"),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (build #{}, {}, {})",
            self.name, self.version, self.build_number, self.profile, self.build_timestamp
        )
    }
}

fn parse_build_number(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

/// Print the startup banner to stderr
pub fn print_startup_banner(settings: &Settings) {
    eprintln!("===============================================");
    eprintln!("  FichaPro - restaurant costing back-office");
    eprintln!("  {}", BuildInfo::current());
    eprintln!("  Database: {}", settings.database_path.display());
    eprintln!("  Pool size: {}", settings.pool_size);
    eprintln!("===============================================");
}
