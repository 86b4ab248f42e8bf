//! Configuration for catset.
//!
//! [`SplitConfig`] is the payload that triggers one dataset generation run,
//! either from the local configuration or as the JSON body of a queued
//! message. [`CatsetConfig`] is the full process configuration, layered by
//! [`load_config`].

use crate::data::split::SplitRatios;
use crate::error::{Result, TransformError};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters of one dataset generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Dataset version to (re)generate. Required in a payload; only the local
    /// configuration falls back to `v1`.
    pub version: String,
    /// Shuffle matched records before splitting.
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub train_ratio: u8,
    #[serde(default)]
    pub validate_ratio: u8,
    #[serde(default)]
    pub test_ratio: u8,
    /// Shuffle seed. A random seed is drawn (and logged) when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        let ratios = SplitRatios::default();
        Self {
            version: default_version(),
            shuffle: true,
            train_ratio: ratios.train,
            validate_ratio: ratios.validate,
            test_ratio: ratios.test,
            seed: None,
        }
    }
}

impl SplitConfig {
    /// Decode a trigger payload such as
    /// `{"version":"v2","shuffle":true,"train_ratio":70,"validate_ratio":15,"test_ratio":15}`.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn ratios(&self) -> SplitRatios {
        SplitRatios::new(self.train_ratio, self.validate_ratio, self.test_ratio)
    }

    /// Reject a run that names no dataset version.
    ///
    /// Ratios are not checked: counts are clamped to the record count and the
    /// remainder flows to `test`.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(TransformError::invalid_config("version must not be empty"));
        }
        Ok(())
    }
}

fn default_version() -> String {
    "v1".to_string()
}

/// Top-level process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatsetConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Split used by a local run.
    #[serde(default)]
    pub dataset: SplitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dataset store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// How long a statement waits on a locked database (seconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("catset.db")
}

fn default_busy_timeout() -> u64 {
    5
}

/// Logging output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines on stderr instead of human-readable text.
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rolling JSON log files. File logging is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// Load configuration with layered merging.
///
/// Priority (highest to lowest):
/// 1. `CATSET_` environment variables (`CATSET_DATASET__VERSION`, `CATSET_DATABASE__PATH`, ...)
/// 2. Explicit config file (`--config`)
/// 3. Workspace config (`<workspace>/.catset/config.toml`)
/// 4. User config (`~/.config/catset/config.toml`)
/// 5. Defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> std::result::Result<CatsetConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(CatsetConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "catset", "catset") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".catset").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("CATSET_").split("__"));

    figment.extract().map_err(Box::new)
}
