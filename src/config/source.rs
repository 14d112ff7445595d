//! Configuration sources
//!
//! Each source overlays its values on the configuration built so far. The
//! builder applies them from lowest to highest priority: file, environment,
//! command line.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::common::parse_socket_addr;
use crate::config::error::{ConfigError, Result};
use crate::config::types::GatewayConfig;

/// Configuration source trait
pub trait ConfigSource {
    /// Overlay this source's values on `config`
    fn apply(&self, config: GatewayConfig) -> Result<GatewayConfig>;

    /// Short description used in log lines
    fn describe(&self) -> String;
}

/// JSON configuration file
///
/// A file replaces the whole configuration; keys missing from it take their
/// default values.
pub struct FileSource {
    pub path: PathBuf,
    pub required: bool,
}

impl FileSource {
    /// A file that must exist
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            required: true,
        }
    }

    /// A file that is skipped when absent
    pub fn optional<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            required: false,
        }
    }
}

impl ConfigSource for FileSource {
    fn apply(&self, config: GatewayConfig) -> Result<GatewayConfig> {
        if !self.path.exists() {
            if self.required {
                return Err(ConfigError::FileNotFound(self.path.clone()));
            }
            warn!("Configuration file not found: {}", self.path.display());
            warn!("Will use default values unless overridden by environment variables or command line arguments");
            return Ok(config);
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::FileReadError(self.path.clone(), e.to_string()))?;

        debug!("Parsing JSON from file: {}", self.path.display());
        let mut loaded: GatewayConfig = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", self.path.display(), e)))?;

        loaded.config_file = Some(self.path.clone());
        Ok(loaded)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Environment variables with a common prefix
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    /// Read variables named `<prefix><NAME>`
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn get(&self, name: &str) -> Option<String> {
        env::var(format!("{}{}", self.prefix, name)).ok()
    }

    fn get_number<T: std::str::FromStr>(&self, name: &str, field: &str) -> Result<Option<T>> {
        match self.get(name) {
            Some(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
                ConfigError::InvalidValue(
                    field.to_string(),
                    format!("{}{} is not a number: {}", self.prefix, name, value),
                )
            }),
            None => Ok(None),
        }
    }
}

impl ConfigSource for EnvSource {
    fn apply(&self, mut config: GatewayConfig) -> Result<GatewayConfig> {
        if let Some(listen) = self.get("LISTEN") {
            config.listen = parse_socket_addr(&listen)
                .map_err(|e| ConfigError::InvalidValue("listen".to_string(), e.to_string()))?;
        }

        if let Some(upstream) = self.get("UPSTREAM") {
            config.upstream = Some(upstream);
        }

        if let Some(log_level) = self.get("LOG_LEVEL") {
            config.log_level = log_level;
        }

        if let Some(buffer_size) = self.get_number("BUFFER_SIZE", "buffer_size")? {
            config.buffer_size = buffer_size;
        }

        if let Some(timeout) = self.get_number("CONNECTION_TIMEOUT", "connection_timeout")? {
            config.connection_timeout = timeout;
        }

        if let Some(timeout) = self.get_number("DETECT_TIMEOUT_MS", "detect_timeout_ms")? {
            config.detect_timeout_ms = timeout;
        }

        Ok(config)
    }

    fn describe(&self) -> String {
        format!("environment ({}*)", self.prefix)
    }
}

/// Explicit overrides, typically from the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub upstream: Option<String>,
    pub log_level: Option<String>,
}

impl ConfigSource for Overrides {
    fn apply(&self, mut config: GatewayConfig) -> Result<GatewayConfig> {
        if let Some(listen) = &self.listen {
            config.listen = parse_socket_addr(listen)
                .map_err(|e| ConfigError::InvalidValue("listen".to_string(), e.to_string()))?;
        }

        if let Some(upstream) = &self.upstream {
            config.upstream = Some(upstream.clone());
        }

        if let Some(log_level) = &self.log_level {
            config.log_level = log_level.clone();
        }

        Ok(config)
    }

    fn describe(&self) -> String {
        "command line".to_string()
    }
}
