//! Persisted tool settings.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "rusty-fat12";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub log_level: String,
    /// Directory `get` writes into; the current directory when unset.
    pub output_dir: Option<PathBuf>,
    /// Read every stored file back and compare it with the source.
    pub verify_after_put: bool,
    /// Emit JSON instead of the text report.
    pub json_output: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            output_dir: None,
            verify_after_put: true,
            json_output: false,
        }
    }
}

impl ToolConfig {
    /// Get the user config directory path
    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR))
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        Self::user_config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist and parse. Otherwise the user config
    /// directory is tried, then `config.json` in the current directory,
    /// then the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        if let Some(user_config) = Self::user_config_path() {
            if let Ok(config) = Self::load_from_path(&user_config) {
                return Ok(config);
            }
        }

        if let Ok(config) = Self::load_from_path(CONFIG_FILE) {
            return Ok(config);
        }

        Ok(Self::default())
    }

    /// Save configuration to the user config directory.
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir =
            Self::user_config_dir().context("could not determine user config directory")?;
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("cannot create {}", config_dir.display()))?;
        let path = config_dir.join(CONFIG_FILE);
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parsed `log_level`; unknown names fall back to `Warn`.
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Warn)
    }
}
