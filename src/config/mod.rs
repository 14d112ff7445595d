//! Configuration module
//!
//! This module handles gateway configuration: loading from a JSON file,
//! environment variables and command line arguments, and validating that the
//! detector bindings only refer to installed detectors and services.

mod builder;
mod defaults;
mod error;
mod source;
mod types;
mod validator;

pub use self::builder::{load_config, ConfigBuilder};
pub use self::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use self::error::{ConfigError, Result};
pub use self::source::{ConfigSource, EnvSource, FileSource, Overrides};
pub use self::types::{DetectorSpec, DispatchSpec, GatewayConfig};
pub use self::validator::{check_warnings, validate_config};
