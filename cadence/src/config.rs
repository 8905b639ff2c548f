//! Locating and reading the RON configuration file

use std::path::{Path, PathBuf};

use crate::controller::Cadence;

pub const CONFIG_ENV: &str = "CADENCE_CONFIG";

/// Find the configuration file using the following precedence:
/// 1. `CADENCE_CONFIG` environment variable
/// 2. ./cadence.config.ron (current working directory)
/// 3. /etc/cadence/cadence.config.ron (system-wide config)
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./cadence.config.ron"),
        PathBuf::from("/etc/cadence/cadence.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Parse the configuration at `path`
pub fn load(path: &Path) -> anyhow::Result<Cadence> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
    })?;

    parse(&content).map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
}

pub fn parse(content: &str) -> anyhow::Result<Cadence> {
    Ok(ron::from_str(content)?)
}
