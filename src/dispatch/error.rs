//! Dispatch errors
//!
//! Every error here is a deployment-configuration problem: a binding refers to
//! a detector or service that the registries do not know. None of them is
//! transient, so callers abort detection for the connection instead of retrying.

use thiserror::Error;

/// Configuration error raised while building or driving a dispatch context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A binding names a detector missing from the detector registry
    #[error("No such detector defined; detector='{detector}'")]
    NoSuchDetector {
        /// Missing detector identifier
        detector: String,
    },

    /// A matching detector is bound to a service missing from the service registry
    #[error("No such service defined; service='{service}'")]
    NoSuchService {
        /// Missing service identifier
        service: String,
    },

    /// The default service is missing from the service registry
    #[error("Could not find default service; service='{service}'")]
    NoSuchDefaultService {
        /// Missing service identifier
        service: String,
    },

    /// The same detector appears in more than one binding
    #[error("Detector bound more than once; detector='{detector}'")]
    DuplicateDetector {
        /// Repeated detector identifier
        detector: String,
    },
}

impl DispatchError {
    /// The identifier an operator has to fix
    pub fn identifier(&self) -> &str {
        match self {
            Self::NoSuchDetector { detector } | Self::DuplicateDetector { detector } => detector,
            Self::NoSuchService { service } | Self::NoSuchDefaultService { service } => service,
        }
    }
}
