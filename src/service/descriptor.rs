//! Service descriptors

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a service does with a connection once it owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceKind {
    /// Replay the buffered client bytes to `target` and relay both directions
    Forward {
        /// Target address (host:port)
        target: String,
    },
    /// Close the client connection
    Reject,
}

/// A startable service, as stored in the service registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: String,
    kind: ServiceKind,
}

impl ServiceDescriptor {
    /// Create a service descriptor
    pub fn new(name: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Service name (the identifier used in dispatch bindings)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Service behaviour
    pub fn kind(&self) -> &ServiceKind {
        &self.kind
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ServiceKind::Forward { target } => write!(f, "{} (forward to {})", self.name, target),
            ServiceKind::Reject => write!(f, "{} (reject)", self.name),
        }
    }
}
