//! Configuration types
//!
//! This module contains the configuration types used throughout the application.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};

use crate::common::parse_socket_addr;
use crate::dispatch::{DetectorBinding, DispatchConfig};
use crate::service::{ServiceKind, StartOptions};
use super::defaults;

/// Custom deserializer for socket addresses
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_socket_addr(&s).map_err(serde::de::Error::custom)
}

/// Definition of an installed detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectorSpec {
    /// TLS handshake record on the client side
    Tls,
    /// HTTP/1.x request line on the client side
    Http,
    /// Server greeting starting with `prefix`
    Banner {
        /// Expected start of the server greeting
        prefix: String,
    },
}

impl DetectorSpec {
    /// Name used for the `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Tls => "tls",
            Self::Http => "http",
            Self::Banner { .. } => "banner",
        }
    }

    /// Whether detectors of this kind watch server-side traffic
    pub fn requires_server_side_protocol(&self) -> bool {
        matches!(self, Self::Banner { .. })
    }
}

/// Ordered detector bindings and the fallback service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchSpec {
    /// Detectors in priority order, each bound to a service
    #[serde(default)]
    pub detectors: Vec<DetectorBinding>,

    /// Service started when every detector ruled itself out or detection timed out
    #[serde(default = "defaults::default_service")]
    pub default_service: String,
}

impl Default for DispatchSpec {
    fn default() -> Self {
        Self {
            detectors: Vec::new(),
            default_service: defaults::default_service(),
        }
    }
}

/// Gateway configuration
///
/// Loaded from a JSON file, then overridden by environment variables and
/// command line arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    // --- Network settings ---

    /// Listen address for the gateway
    #[serde(default = "defaults::listen", deserialize_with = "deserialize_socket_addr")]
    pub listen: SocketAddr,

    /// Server contacted while detectors need server-side traffic (host:port)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Relay buffer size in bytes; also caps the bytes buffered during detection
    #[serde(default = "defaults::buffer_size")]
    pub buffer_size: usize,

    /// Connection timeout in seconds
    #[serde(default = "defaults::connection_timeout")]
    pub connection_timeout: u64,

    /// Detection timeout in milliseconds
    #[serde(default = "defaults::detect_timeout_ms")]
    pub detect_timeout_ms: u64,

    // --- Detection settings ---

    /// Installed detectors by identifier
    #[serde(default)]
    pub detectors: BTreeMap<String, DetectorSpec>,

    /// Installed services by identifier
    #[serde(default = "defaults::services")]
    pub services: BTreeMap<String, ServiceKind>,

    /// Detector bindings and default service
    #[serde(default)]
    pub dispatch: DispatchSpec,

    /// File this configuration was loaded from
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            upstream: None,
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connection_timeout: defaults::connection_timeout(),
            detect_timeout_ms: defaults::detect_timeout_ms(),
            detectors: BTreeMap::new(),
            services: defaults::services(),
            dispatch: DispatchSpec::default(),
            config_file: None,
        }
    }
}

impl GatewayConfig {
    /// Detection timeout
    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }

    /// Connection timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Dispatch settings shared by every connection
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::new(self.dispatch.detectors.clone(), self.dispatch.default_service.clone())
            .with_timeout(self.detect_timeout())
    }

    /// Settings for the built-in services
    pub fn start_options(&self) -> StartOptions {
        StartOptions {
            connect_timeout: self.connect_timeout(),
            buffer_size: self.buffer_size,
        }
    }

    /// Whether any bound detector needs the server side
    pub fn needs_upstream(&self) -> bool {
        self.dispatch.detectors.iter().any(|binding| {
            self.detectors
                .get(&binding.detector)
                .is_some_and(DetectorSpec::requires_server_side_protocol)
        })
    }

    /// Get the configuration file path
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Log the configuration
    pub fn log(&self) {
        debug!("=== Configuration ===");
        debug!("Network settings:");
        debug!("  Listen address: {}", self.listen);
        debug!("  Upstream: {}", self.upstream.as_deref().unwrap_or("<none>"));

        debug!("General settings:");
        debug!("  Log level: {}", self.log_level);
        debug!("  Buffer size: {} bytes", self.buffer_size);
        debug!("  Connection timeout: {} seconds", self.connection_timeout);
        debug!("  Detection timeout: {} ms", self.detect_timeout_ms);

        debug!("Detectors:");
        for (id, spec) in &self.detectors {
            debug!("  {} ({})", id, spec.type_name());
        }

        debug!("Services:");
        for (name, kind) in &self.services {
            match kind {
                ServiceKind::Forward { target } => debug!("  {} (forward to {})", name, target),
                ServiceKind::Reject => debug!("  {} (reject)", name),
            }
        }

        debug!("Dispatch order:");
        for (index, binding) in self.dispatch.detectors.iter().enumerate() {
            debug!("  {}. {} -> {}", index + 1, binding.detector, binding.service);
        }
        debug!("  default -> {}", self.dispatch.default_service);

        if let Some(file) = self.config_file() {
            debug!("  Configuration file: {}", file.display());
        }

        debug!("=====================");
    }
}
