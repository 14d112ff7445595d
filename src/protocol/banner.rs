//! Server banner detector
//!
//! Server-first protocols (SMTP, FTP, POP3, SSH) announce themselves with a
//! greeting before the client says anything useful. This detector needs the
//! gateway to open the server side and watches the greeting for a configured
//! prefix.

use log::{debug, trace};

use super::detector::{Detector, Side, Verdict};

/// Detector matching the beginning of the server greeting
#[derive(Debug, Clone)]
pub struct BannerDetector {
    prefix: Vec<u8>,
}

impl BannerDetector {
    /// Create a banner detector matching `prefix`
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn check_greeting(&self, data: &[u8]) -> Verdict {
        let seen = data.len().min(self.prefix.len());
        if data[..seen] != self.prefix[..seen] {
            debug!("Server greeting does not start with the expected banner");
            return Verdict::NoMatch;
        }

        if seen < self.prefix.len() {
            trace!("Banner detector needs more data; got {} of {} bytes", seen, self.prefix.len());
            return Verdict::Undecided;
        }

        debug!("Server banner detected");
        Verdict::Match
    }
}

impl Detector for BannerDetector {
    fn detect(&self, side: Side, data: &[u8]) -> Verdict {
        match side {
            // A talkative client has to be heard by the server before it answers
            Side::Client if !data.is_empty() => Verdict::CopyClient(data.len()),
            Side::Client => Verdict::Undecided,
            Side::Server => self.check_greeting(data),
        }
    }

    fn requires_server_side_protocol(&self) -> bool {
        true
    }
}
