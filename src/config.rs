//! Configuration loading
//!
//! The TOML file is optional. Values from the command line win over the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use opsconsole_types::ConsoleConfig;

const APP_DIR: &str = "opsconsole";

/// `<config_dir>/opsconsole/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// Read the config file, falling back to defaults when it does not exist
pub fn load(path: Option<&Path>) -> Result<ConsoleConfig> {
    let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
        return Ok(ConsoleConfig::default());
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(ConsoleConfig::default());
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Values given on the command line
#[derive(Debug, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub metrics_url: Option<String>,
    pub buffer_size: Option<usize>,
    pub state_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, config: &mut ConsoleConfig) {
        if let Some(url) = self.url {
            config.stream.url = url;
        }
        if let Some(url) = self.metrics_url {
            config.metrics.url = url;
        }
        if let Some(size) = self.buffer_size {
            config.buffer.capacity = size;
        }
        if let Some(dir) = self.state_dir {
            config.store.dir = Some(dir.to_string_lossy().into_owned());
        }
    }
}

/// Directory holding the persistent store
pub fn state_dir(config: &ConsoleConfig) -> PathBuf {
    match &config.store.dir {
        Some(dir) => PathBuf::from(dir),
        None => dirs::cache_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(".opsconsole")),
    }
}
