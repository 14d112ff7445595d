//! Detector and service registries
//!
//! The dispatcher only sees the two lookup traits. [`Detectors`] and
//! [`Services`] are the in-memory tables the gateway builds from its
//! configuration at startup; after that they are shared read-only between
//! connections.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::config::DetectorSpec;
use crate::protocol::{BannerDetector, Detector, HttpDetector, TlsDetector};
use crate::service::{ServiceDescriptor, ServiceKind};

/// Resolve a detector identifier to a detector instance
pub trait DetectorRegistry: Send + Sync {
    /// Look up `id`; `None` when no such detector is installed
    fn lookup(&self, id: &str) -> Option<Arc<dyn Detector>>;
}

/// Resolve a service identifier to a startable service
pub trait ServiceRegistry: Send + Sync {
    /// Look up `id`; `None` when no such service is installed
    fn lookup(&self, id: &str) -> Option<Arc<ServiceDescriptor>>;
}

/// In-memory detector table
#[derive(Default, Clone)]
pub struct Detectors {
    entries: HashMap<String, Arc<dyn Detector>>,
}

impl Detectors {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a detector under `id`, replacing any previous one
    pub fn insert(&mut self, id: impl Into<String>, detector: Arc<dyn Detector>) -> &mut Self {
        self.entries.insert(id.into(), detector);
        self
    }

    /// Build the table from configured detector definitions
    pub fn from_config<'a, I>(specs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a DetectorSpec)>,
    {
        let mut detectors = Self::new();
        for (id, spec) in specs {
            let detector: Arc<dyn Detector> = match spec {
                DetectorSpec::Tls => Arc::new(TlsDetector::new()),
                DetectorSpec::Http => Arc::new(HttpDetector::new()),
                DetectorSpec::Banner { prefix } => Arc::new(BannerDetector::new(prefix.as_bytes())),
            };
            debug!("Installing detector; detector='{}', type='{}'", id, spec.type_name());
            detectors.insert(id.clone(), detector);
        }
        detectors
    }

    /// Number of installed detectors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no detector is installed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DetectorRegistry for Detectors {
    fn lookup(&self, id: &str) -> Option<Arc<dyn Detector>> {
        self.entries.get(id).cloned()
    }
}

/// In-memory service table
#[derive(Debug, Default, Clone)]
pub struct Services {
    entries: HashMap<String, Arc<ServiceDescriptor>>,
}

impl Services {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a service under its own name
    pub fn insert(&mut self, service: ServiceDescriptor) -> &mut Self {
        self.entries.insert(service.name().to_string(), Arc::new(service));
        self
    }

    /// Build the table from configured service definitions
    pub fn from_config<'a, I>(specs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a ServiceKind)>,
    {
        let mut services = Self::new();
        for (name, kind) in specs {
            let service = ServiceDescriptor::new(name.clone(), kind.clone());
            debug!("Installing service; service='{}'", service);
            services.insert(service);
        }
        services
    }

    /// Number of installed services
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no service is installed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ServiceRegistry for Services {
    fn lookup(&self, id: &str) -> Option<Arc<ServiceDescriptor>> {
        self.entries.get(id).cloned()
    }
}
