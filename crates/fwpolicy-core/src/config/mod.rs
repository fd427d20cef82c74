//! Engine configuration
//!
//! TOML file with one table per concern. Every field has a default, so an
//! empty file is a valid configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lookup cache sizing
    pub cache: CacheConfig,

    /// Durable store location
    pub persistence: PersistenceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// [`Error::ConfigNotFound`] if the file cannot be read, or a parse error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    ///
    /// # Errors
    /// Returns [`Error::TomlParse`] on malformed input.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Serialize to pretty TOML
    ///
    /// # Errors
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Write the configuration to `path`, creating parent directories
    ///
    /// # Errors
    /// Fails on serialization or I/O errors.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    /// Returns [`Error::ConfigValue`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.cache.domain_capacity == 0 {
            return Err(Error::config_value("cache.domain_capacity", "Must be greater than 0"));
        }
        if self.cache.ip_capacity == 0 {
            return Err(Error::config_value("cache.ip_capacity", "Must be greater than 0"));
        }

        if let Some(path) = &self.persistence.path {
            if path.as_os_str().is_empty() {
                return Err(Error::config_value("persistence.path", "Must not be empty"));
            }
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error", "off"].contains(&level.as_str()) {
            return Err(Error::config_value(
                "logging.level",
                format!("Unknown level '{}'", self.logging.level),
            ));
        }

        Ok(())
    }
}

/// Lookup cache sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached domain resolutions
    pub domain_capacity: u64,
    /// Maximum cached connection resolutions
    pub ip_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            domain_capacity: 5000,
            ip_capacity: 5000,
        }
    }
}

/// Durable store location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Snapshot file (None = in-memory only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log file path (None = stderr only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Enable JSON format logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json_format: false,
        }
    }
}
