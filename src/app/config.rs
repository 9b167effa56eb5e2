//! Application configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where state is kept
    pub general: GeneralConfig,

    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Settings file holding the ignore list (defaults to the data dir)
    pub settings_file: Option<PathBuf>,

    /// Scope file exclusions are written to (defaults to the data dir)
    pub scope_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,

    /// Emit JSON lines instead of plain text
    pub json: bool,

    /// Also write a daily-rotated log file here
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl Config {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(|source| {
                ConfigError::ReadError {
                    path: config_path.display().to_string(),
                    source,
                }
            })?;

            let config: Config = toml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;

            tracing::info!("Loaded configuration from {:?}", config_path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.trim().to_ascii_lowercase();
        // Full EnvFilter directives ("ofs_vanisher=debug") are accepted as-is
        if !level.contains('=') && !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logging.level".into(),
                reason: format!("unknown level '{}'", self.logging.level),
            });
        }

        for (field, path) in [
            ("general.settings_file", &self.general.settings_file),
            ("general.scope_file", &self.general.scope_file),
        ] {
            if path.as_ref().is_some_and(|p| p.is_dir()) {
                return Err(ConfigError::ValidationError {
                    field: field.into(),
                    reason: "points at a directory".into(),
                });
            }
        }
        Ok(())
    }

    /// Default configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Settings file, configured or under the data dir
    pub fn settings_path(&self) -> Result<PathBuf> {
        match &self.general.settings_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("settings.json")),
        }
    }

    /// Scope file, configured or under the data dir
    pub fn scope_path(&self) -> Result<PathBuf> {
        match &self.general.scope_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("scope.toml")),
        }
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "ofs-vanisher", "ofs-vanisher")
            .ok_or_else(|| ConfigError::NoProjectDir("config".into()))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "ofs-vanisher", "ofs-vanisher")
            .ok_or_else(|| ConfigError::NoProjectDir("data".into()))?;

        Ok(dirs.data_dir().to_path_buf())
    }
}
