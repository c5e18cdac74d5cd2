//! Engine configuration loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use netprobe_engine::EngineConfig;

/// `<config_dir>/netprobe/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("netprobe").join("config.toml"))
}

/// Load the engine configuration.
///
/// An explicit path must exist. Without one, the default location is used if
/// present, otherwise built-in defaults apply.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.is_file() => path,
            _ => {
                tracing::debug!("No config file, using defaults");
                return Ok(EngineConfig::default());
            }
        },
    };
    read_config(&path)
}

fn read_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = toml::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}
