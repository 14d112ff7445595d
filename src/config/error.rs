//! Configuration errors
//!
//! Everything that can go wrong while loading or validating the gateway
//! configuration. The variants name the offending file or field.

use std::fmt;
use std::error::Error;
use std::path::PathBuf;

/// Configuration error type
#[derive(Debug)]
pub enum ConfigError {
    /// Explicitly requested configuration file does not exist
    FileNotFound(PathBuf),

    /// Configuration file exists but cannot be read
    FileReadError(PathBuf, String),

    /// Configuration file is not valid gateway JSON
    ParseError(String),

    /// Field holds a value the gateway cannot use (field, reason)
    InvalidValue(String, String),

    /// Field the current detector bindings depend on is not set
    MissingRequiredValue(String),

    /// Fields that are valid alone but conflict with each other
    InvalidCombination(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) =>
                write!(f, "Gateway configuration file not found: {}", path.display()),

            ConfigError::FileReadError(path, err) =>
                write!(f, "Cannot read gateway configuration {}: {}", path.display(), err),

            ConfigError::ParseError(msg) =>
                write!(f, "Malformed gateway configuration: {}", msg),

            ConfigError::InvalidValue(field, reason) =>
                write!(f, "Bad value for '{}': {}", field, reason),

            ConfigError::MissingRequiredValue(field) =>
                write!(f, "Required setting '{}' is not set", field),

            ConfigError::InvalidCombination(msg) =>
                write!(f, "Conflicting dispatch settings: {}", msg),
        }
    }
}

impl Error for ConfigError {}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

// Convert to crate's common error type
impl From<ConfigError> for crate::common::ProxyError {
    fn from(err: ConfigError) -> Self {
        crate::common::ProxyError::Config(err.to_string())
    }
}
