//! Detector capability
//!
//! Every protocol detector implements [`Detector`]. Detectors are stateless with
//! respect to a single connection: the session host passes everything it has
//! buffered for a side, and the detector answers from those bytes alone.

use std::fmt;

/// Which half of the connection a chunk of bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Client-facing side
    Client,
    /// Server-facing side
    Server,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Server => write!(f, "server"),
        }
    }
}

/// Answer of a detector for the bytes seen so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Protocol identified
    Match,
    /// Protocol ruled out
    NoMatch,
    /// Need more data
    Undecided,
    /// Server bytes are needed; replay this many client bytes to the server first
    CopyClient(usize),
}

/// Protocol detector trait
///
/// Implementations must be cheap to call repeatedly; the dispatcher invokes
/// them once per arriving chunk until they settle.
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send + Sync {
    /// Inspect `data` received from `side` and report a verdict
    fn detect(&self, side: Side, data: &[u8]) -> Verdict;

    /// Whether this detector needs to observe server-side traffic
    ///
    /// Read once when a dispatch context is built. A single detector needing
    /// server bytes makes the gateway connect upstream for the whole connection.
    fn requires_server_side_protocol(&self) -> bool {
        false
    }
}
