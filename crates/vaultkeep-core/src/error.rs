//! Error types for vaultkeep-core

use thiserror::Error;

/// Result type alias using vaultkeep-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. All of them are raised before any side effect.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Unsupported destination backend
    #[error("Unsupported destination type: {kind}. Only 'local' destinations are supported")]
    UnsupportedDestination { kind: String },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an unsupported destination error
    pub fn unsupported_destination(kind: impl Into<String>) -> Self {
        Self::UnsupportedDestination { kind: kind.into() }
    }
}
