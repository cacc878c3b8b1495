//! Configuration loading for the spatia CLI

use anyhow::{Context, Result};
use spatia_xr::XrConfig;
use std::path::{Path, PathBuf};

/// Load configuration from file or use defaults
pub fn load_config(path: Option<PathBuf>) -> Result<XrConfig> {
    if let Some(path) = path {
        read_config(&path)
    } else if let Some(path) = default_config_path().filter(|p| p.exists()) {
        read_config(&path)
    } else {
        Ok(XrConfig::default())
    }
}

/// `~/.spatia/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".spatia").join("config.toml"))
}

fn read_config(path: &Path) -> Result<XrConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = XrConfig::from_toml_str(&content)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}
