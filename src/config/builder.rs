//! Configuration builder
//!
//! This module provides a builder pattern for constructing configuration.

use std::path::Path;
use log::{debug, info, warn};

use crate::config::types::GatewayConfig;
use crate::config::source::{ConfigSource, EnvSource, FileSource, Overrides};
use crate::config::validator::{check_warnings, validate_config};
use crate::config::error::Result;
use crate::config::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};

/// Configuration builder
///
/// Provides a fluent API for building configuration from multiple sources.
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    validate: bool,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            validate: true,
        }
    }

    /// Add a configuration file that must exist
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        debug!("Adding file configuration source: {}", path.as_ref().display());
        self.sources.push(Box::new(FileSource::new(path)));
        self
    }

    /// Add a configuration file that is skipped when absent
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        debug!("Adding optional file configuration source: {}", path.as_ref().display());
        self.sources.push(Box::new(FileSource::optional(path)));
        self
    }

    /// Add environment source
    pub fn with_env(mut self, prefix: &str) -> Self {
        debug!("Adding environment configuration source with prefix: {}", prefix);
        self.sources.push(Box::new(EnvSource::new(prefix)));
        self
    }

    /// Add explicit overrides (command line)
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        debug!("Adding command line configuration source");
        self.sources.push(Box::new(overrides));
        self
    }

    /// Disable validation
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<GatewayConfig> {
        let mut config = GatewayConfig::default();

        debug!("Building configuration from {} sources", self.sources.len());

        // Apply sources in order (lowest to highest priority)
        for source in self.sources {
            debug!("Loading configuration from source: {}", source.describe());
            config = source.apply(config)?;
        }

        if self.validate {
            debug!("Validating configuration");
            validate_config(&config)?;

            for warning in check_warnings(&config) {
                warn!("{}", warning);
            }
        }

        config.log();

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
            .with_optional_file(DEFAULT_CONFIG_FILE)
            .with_env(ENV_PREFIX)
    }
}

/// Load configuration from the usual sources
///
/// Priority, lowest first:
/// 1. Default values
/// 2. Configuration file (`config_file`, or `config.json` when present)
/// 3. Environment variables
/// 4. Command line overrides
pub fn load_config(config_file: Option<&Path>, overrides: Overrides) -> Result<GatewayConfig> {
    let builder = match config_file {
        Some(path) => {
            info!("Using configuration file: {}", path.display());
            ConfigBuilder::new().with_file(path)
        }
        None => ConfigBuilder::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };

    builder
        .with_env(ENV_PREFIX)
        .with_overrides(overrides)
        .build()
}
