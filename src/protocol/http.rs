//! HTTP/1.x request detector

use log::{debug, trace};

use super::detector::{Detector, Side, Verdict};

/// Request methods accepted at the start of a client stream
const METHODS: &[&[u8]] = &[
    b"GET", b"POST", b"PUT", b"HEAD", b"DELETE", b"OPTIONS", b"PATCH", b"CONNECT", b"TRACE",
];

/// HTTP protocol detector
///
/// Matches when the client stream starts with a known method token followed
/// by a space. While the buffered bytes are still a prefix of some `METHOD `
/// the verdict stays undecided.
#[derive(Debug, Clone, Default)]
pub struct HttpDetector;

impl HttpDetector {
    /// Create an HTTP detector
    pub fn new() -> Self {
        Self
    }

    fn check_request_line(&self, data: &[u8]) -> Verdict {
        let mut undecided = false;

        for method in METHODS {
            let token_len = method.len() + 1;
            let prefix = &data[..data.len().min(token_len)];

            let matches_so_far = prefix
                .iter()
                .zip(method.iter().chain(std::iter::once(&b' ')))
                .all(|(got, want)| got == want);
            if !matches_so_far {
                continue;
            }

            if data.len() >= token_len {
                debug!("HTTP request line detected; method='{}'", String::from_utf8_lossy(method));
                return Verdict::Match;
            }
            undecided = true;
        }

        if undecided {
            trace!("HTTP detector needs more data; got {} bytes", data.len());
            Verdict::Undecided
        } else {
            Verdict::NoMatch
        }
    }
}

impl Detector for HttpDetector {
    fn detect(&self, side: Side, data: &[u8]) -> Verdict {
        match side {
            Side::Client => self.check_request_line(data),
            Side::Server => Verdict::Undecided,
        }
    }
}
