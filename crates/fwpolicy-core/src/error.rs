//! Error types for fwpolicy-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.
//!
//! Note that the resolvers never return these: a lookup that cannot be
//! answered resolves to the default-allow status instead. Errors only
//! surface from loading, configuration and the synchronous validation
//! performed by the mutation surface.

use thiserror::Error;

/// Main error type for fwpolicy-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Host specifier could not be parsed
    #[error("Invalid host specifier: {host}")]
    InvalidHost {
        /// The rejected input
        host: String,
    },

    /// Domain rule pattern could not be compiled
    #[error("Invalid domain pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// Error message
        message: String,
    },

    /// Persistence collaborator failed
    #[error("Persistence error during {operation}: {message}")]
    Persistence {
        /// Repository operation that failed
        operation: &'static str,
        /// Error message
        message: String,
    },

    /// A persisted enum id is unknown
    #[error("Unknown {kind} id: {id}")]
    UnknownId {
        /// Enum name
        kind: &'static str,
        /// The rejected id
        id: i32,
    },

    /// A status or kind name is unknown
    #[error("Unknown {kind} name: {name}")]
    UnknownName {
        /// Enum name
        kind: &'static str,
        /// The rejected name
        name: String,
    },

    /// The background mutation worker has stopped
    #[error("Background worker is no longer running")]
    WorkerGone,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path to the missing config file
        path: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid host error
    pub fn invalid_host(host: impl Into<String>) -> Self {
        Self::InvalidHost { host: host.into() }
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Persistence {
            operation,
            message: message.into(),
        }
    }

    /// Create a config value error
    pub fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
