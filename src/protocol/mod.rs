//! Protocol detection module
//!
//! This module provides the detector capability consumed by the dispatcher and
//! the detectors shipped with the gateway. A detector inspects the bytes buffered
//! so far on one side of a connection and reports a [`Verdict`]; it never reads
//! from the socket itself, which keeps detectors synchronous and shareable
//! between connections.

mod detector;
mod tls;
mod http;
mod banner;

pub use detector::{Detector, Side, Verdict};
#[cfg(test)]
pub use detector::MockDetector;
pub use tls::TlsDetector;
pub use http::HttpDetector;
pub use banner::BannerDetector;
