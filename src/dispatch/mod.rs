//! Detector dispatcher
//!
//! Decides which service takes over a connection whose protocol is not known
//! yet. The [`DispatchContext`] holds one verdict per configured detector and is
//! driven by the session host with the bytes arriving on either side. Detectors
//! and services are reached through the [`DetectorRegistry`] and
//! [`ServiceRegistry`] traits so the dispatcher can be exercised with any
//! registry implementation.

mod context;
mod error;
mod registry;

pub use context::{
    DetectOutcome, DetectorBinding, DispatchConfig, DispatchContext, VerdictState,
    DEFAULT_DETECT_TIMEOUT,
};
pub use error::DispatchError;
pub use registry::{DetectorRegistry, Detectors, ServiceRegistry, Services};
