//! Build script for FichaPro
//!
//! Embeds a monotonically increasing build number, the build time and the
//! cargo profile.

use std::fs;
use std::path::Path;

const BUILD_NUMBER_FILE: &str = "build_number.txt";

fn next_build_number(path: &Path) -> u64 {
    let previous = fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let next = previous + 1;
    if let Err(e) = fs::write(path, next.to_string()) {
        println!("cargo:warning=Could not persist build number: {}", e);
    }
    next
}

fn main() {
    println!("cargo:rerun-if-changed=src");

    let build = next_build_number(Path::new(BUILD_NUMBER_FILE));
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=FICHAPRO_BUILD_NUMBER={}", build);
    println!("cargo:rustc-env=FICHAPRO_BUILD_TIMESTAMP={}", timestamp);
    println!("cargo:rustc-env=FICHAPRO_BUILD_PROFILE={}", profile);
    println!("cargo:warning=FichaPro build #{} ({}) at {}", build, profile, timestamp);
}
