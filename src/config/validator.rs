//! Configuration validator
//!
//! Catches configuration mistakes at startup: the dispatcher would otherwise
//! report a dangling detector or service only when the first connection
//! arrives.

use std::collections::HashSet;

use crate::common::net::has_host_and_port;
use crate::config::types::{DetectorSpec, GatewayConfig};
use crate::config::error::{ConfigError, Result};
use crate::service::ServiceKind;

/// Validate the configuration
pub fn validate_config(config: &GatewayConfig) -> Result<()> {
    validate_general_settings(config)?;
    validate_services(config)?;
    validate_detectors(config)?;
    validate_dispatch(config)?;
    validate_network_settings(config)?;

    Ok(())
}

/// Validate general settings
fn validate_general_settings(config: &GatewayConfig) -> Result<()> {
    if config.buffer_size == 0 {
        return Err(ConfigError::InvalidValue(
            "buffer_size".to_string(),
            "Buffer size must be greater than 0".to_string(),
        ));
    }

    if config.connection_timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "connection_timeout".to_string(),
            "Connection timeout must be greater than 0".to_string(),
        ));
    }

    if config.detect_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue(
            "detect_timeout_ms".to_string(),
            "Detection timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate service definitions
fn validate_services(config: &GatewayConfig) -> Result<()> {
    for (name, kind) in &config.services {
        if let ServiceKind::Forward { target } = kind {
            if !has_host_and_port(target) {
                return Err(ConfigError::InvalidValue(
                    format!("services.{}.target", name),
                    format!("Expected host:port, got '{}'", target),
                ));
            }
        }
    }

    Ok(())
}

/// Validate detector definitions
fn validate_detectors(config: &GatewayConfig) -> Result<()> {
    for (id, spec) in &config.detectors {
        if let DetectorSpec::Banner { prefix } = spec {
            if prefix.is_empty() {
                return Err(ConfigError::InvalidValue(
                    format!("detectors.{}.prefix", id),
                    "Banner prefix must not be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Validate detector bindings against the installed detectors and services
fn validate_dispatch(config: &GatewayConfig) -> Result<()> {
    let mut seen = HashSet::new();

    for binding in &config.dispatch.detectors {
        if !seen.insert(binding.detector.as_str()) {
            return Err(ConfigError::InvalidCombination(format!(
                "Detector bound more than once; detector='{}'",
                binding.detector
            )));
        }

        if !config.detectors.contains_key(&binding.detector) {
            return Err(ConfigError::InvalidValue(
                "dispatch.detectors".to_string(),
                format!("No such detector defined; detector='{}'", binding.detector),
            ));
        }

        if !config.services.contains_key(&binding.service) {
            return Err(ConfigError::InvalidValue(
                "dispatch.detectors".to_string(),
                format!("No such service defined; service='{}'", binding.service),
            ));
        }
    }

    if config.dispatch.default_service.is_empty() {
        return Err(ConfigError::MissingRequiredValue("dispatch.default_service".to_string()));
    }

    if !config.services.contains_key(&config.dispatch.default_service) {
        return Err(ConfigError::InvalidValue(
            "dispatch.default_service".to_string(),
            format!(
                "Could not find default service; service='{}'",
                config.dispatch.default_service
            ),
        ));
    }

    Ok(())
}

/// Validate network settings
fn validate_network_settings(config: &GatewayConfig) -> Result<()> {
    match &config.upstream {
        Some(upstream) if !has_host_and_port(upstream) => Err(ConfigError::InvalidValue(
            "upstream".to_string(),
            format!("Expected host:port, got '{}'", upstream),
        )),
        None if config.needs_upstream() => Err(ConfigError::MissingRequiredValue(
            "upstream".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Check configuration for non-fatal issues
pub fn check_warnings(config: &GatewayConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    match config.log_level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => {}
        level => {
            warnings.push(format!("Invalid log level '{}', using default 'info'", level));
        }
    }

    if config.dispatch.detectors.is_empty() {
        warnings.push(format!(
            "No detectors bound; every connection goes to '{}'",
            config.dispatch.default_service
        ));
    }

    for id in config.detectors.keys() {
        if !config.dispatch.detectors.iter().any(|b| &b.detector == id) {
            warnings.push(format!("Detector '{}' is defined but not bound", id));
        }
    }

    for name in config.services.keys() {
        let used = name == &config.dispatch.default_service
            || config.dispatch.detectors.iter().any(|b| &b.service == name);
        if !used {
            warnings.push(format!("Service '{}' is defined but never selected", name));
        }
    }

    warnings
}
