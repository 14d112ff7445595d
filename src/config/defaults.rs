//! Default configuration values
//!
//! Single source of truth for defaults; serde attributes and the builder both
//! read from here.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::dispatch::DEFAULT_DETECT_TIMEOUT;
use crate::service::ServiceKind;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "AUTO_DETECT_GATEWAY_";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Name of the service installed when none is configured
pub const REJECT_SERVICE: &str = "reject";

/// Default listen address
pub fn listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default buffer size (8KB), also the cap on bytes buffered during detection
pub fn buffer_size() -> usize {
    8192
}

/// Default connection timeout in seconds
pub fn connection_timeout() -> u64 {
    30
}

/// Default detection timeout in milliseconds
pub fn detect_timeout_ms() -> u64 {
    DEFAULT_DETECT_TIMEOUT.as_millis() as u64
}

/// Default service table: a single service closing every connection
pub fn services() -> BTreeMap<String, ServiceKind> {
    let mut services = BTreeMap::new();
    services.insert(REJECT_SERVICE.to_string(), ServiceKind::Reject);
    services
}

/// Default service used when detection cannot decide
pub fn default_service() -> String {
    REJECT_SERVICE.to_string()
}
