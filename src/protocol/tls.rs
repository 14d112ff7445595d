//! TLS detector
//!
//! Recognises a TLS handshake record at the start of the client stream by
//! examining the record header: content type 0x16, a known protocol version
//! and a plausible record length.

use log::{debug, trace};

use super::detector::{Detector, Side, Verdict};

/// Content type of a TLS handshake record
const HANDSHAKE_RECORD: u8 = 0x16;

/// Largest record payload allowed by TLS (2^14 bytes)
const MAX_RECORD_LENGTH: usize = 16384;

/// TLS protocol detector
#[derive(Debug, Clone)]
pub struct TlsDetector {
    /// Bytes needed to read the whole record header
    min_bytes: usize,
}

impl Default for TlsDetector {
    fn default() -> Self {
        Self { min_bytes: 5 }
    }
}

impl TlsDetector {
    /// Create a TLS detector
    pub fn new() -> Self {
        Self::default()
    }

    fn check_record_header(&self, data: &[u8]) -> Verdict {
        if data.is_empty() {
            return Verdict::Undecided;
        }

        if data[0] != HANDSHAKE_RECORD {
            debug!("Not a TLS handshake: first byte is {:#04x}, expected 0x16", data[0]);
            return Verdict::NoMatch;
        }

        // Version bytes, as far as we have them: SSLv3 (3.0) up to TLS 1.3 (3.4)
        if let Some(&major) = data.get(1) {
            if major != 0x03 {
                trace!("Invalid TLS major version: {:#04x}", major);
                return Verdict::NoMatch;
            }
        }
        if let Some(&minor) = data.get(2) {
            if minor > 0x04 {
                trace!("Invalid TLS version: 3.{}", minor);
                return Verdict::NoMatch;
            }
        }

        if data.len() < self.min_bytes {
            trace!("Not enough data to determine protocol: got {} bytes, need {}", data.len(), self.min_bytes);
            return Verdict::Undecided;
        }

        let record_length = ((data[3] as usize) << 8) | (data[4] as usize);
        if !(4..=MAX_RECORD_LENGTH).contains(&record_length) {
            trace!("Invalid TLS record length: {}", record_length);
            return Verdict::NoMatch;
        }

        debug!("TLS protocol detected");
        Verdict::Match
    }
}

impl Detector for TlsDetector {
    fn detect(&self, side: Side, data: &[u8]) -> Verdict {
        match side {
            Side::Client => self.check_record_header(data),
            // The client speaks first in TLS; server bytes tell us nothing.
            Side::Server => Verdict::Undecided,
        }
    }
}
