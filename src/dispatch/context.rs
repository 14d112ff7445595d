//! Per-connection dispatch state
//!
//! A [`DispatchContext`] is created when auto-detection starts on a connection.
//! The session host feeds it the bytes buffered on either side; the context asks
//! every detector that has not yet ruled itself out, and settles on a service as
//! soon as one detector matches or all of them have said no.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::protocol::{Side, Verdict};
use crate::service::ServiceDescriptor;
use super::error::DispatchError;
use super::registry::{DetectorRegistry, ServiceRegistry};

/// Detection budget used when none is configured
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// One entry of the ordered detector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorBinding {
    /// Detector identifier
    pub detector: String,
    /// Service started when the detector matches
    pub service: String,
}

impl DetectorBinding {
    /// Bind `detector` to `service`
    pub fn new(detector: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            detector: detector.into(),
            service: service.into(),
        }
    }
}

/// Cumulative verdict recorded for a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictState {
    /// Nothing conclusive yet
    Undecided,
    /// Protocol identified
    Match,
    /// Protocol ruled out; the detector is not asked again
    NoMatch,
    /// Waiting for server bytes after a client replay request
    AwaitingServerData,
}

impl VerdictState {
    /// State after a detector reported `verdict` while in `self`
    ///
    /// A detector never falls back to `Undecided` once it asked for server data.
    fn advance(self, verdict: Verdict) -> Self {
        match (self, verdict) {
            (Self::AwaitingServerData, Verdict::Undecided) => Self::AwaitingServerData,
            (_, Verdict::Undecided) => Self::Undecided,
            (_, Verdict::Match) => Self::Match,
            (_, Verdict::NoMatch) => Self::NoMatch,
            (_, Verdict::CopyClient(_)) => Self::AwaitingServerData,
        }
    }
}

impl fmt::Display for VerdictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecided => write!(f, "undecided"),
            Self::Match => write!(f, "match"),
            Self::NoMatch => write!(f, "nomatch"),
            Self::AwaitingServerData => write!(f, "awaiting-server-data"),
        }
    }
}

/// Static dispatch settings shared by every connection of a listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Ordered detector bindings; order is priority
    pub bindings: Vec<DetectorBinding>,
    /// Service used when every detector ruled itself out
    pub default_service: String,
    /// Time the session host allows for detection
    pub timeout: Duration,
}

impl DispatchConfig {
    /// Create a dispatch configuration with the default timeout
    pub fn new(bindings: Vec<DetectorBinding>, default_service: impl Into<String>) -> Self {
        Self {
            bindings,
            default_service: default_service.into(),
            timeout: DEFAULT_DETECT_TIMEOUT,
        }
    }

    /// Override the detection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of one detection step
///
/// The flags mirror the context after the step so the caller does not need to
/// query it separately.
#[derive(Debug, Clone)]
pub struct DetectOutcome {
    /// Chosen service, `None` while still undecided
    pub service: Option<Arc<ServiceDescriptor>>,
    /// The session host must open the server side
    pub need_server_connect: bool,
    /// Client bytes that must have been replayed to the server
    pub copy_client_data: Option<usize>,
    /// The default service was forced; the dispatcher will not be consulted again
    pub quit: bool,
}

impl DetectOutcome {
    /// Name of the chosen service, if any
    pub fn service_id(&self) -> Option<&str> {
        self.service.as_deref().map(ServiceDescriptor::name)
    }

    /// Whether a service was chosen
    pub fn is_decided(&self) -> bool {
        self.service.is_some()
    }
}

/// Detector dispatcher for a single connection
pub struct DispatchContext {
    bindings: Vec<DetectorBinding>,
    verdicts: HashMap<String, VerdictState>,
    /// Detectors that watch server-side traffic
    server_side: HashSet<String>,
    default_service: String,
    timeout: Duration,
    need_server_connect: bool,
    copy_client_data: Option<usize>,
    quit: bool,
    decision: Option<Arc<ServiceDescriptor>>,
    session_id: String,
    detectors: Arc<dyn DetectorRegistry>,
    services: Arc<dyn ServiceRegistry>,
}

impl DispatchContext {
    /// Build a dispatch context
    ///
    /// Every bound detector is resolved right away so a broken configuration is
    /// reported before any byte is inspected.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoSuchDetector`] for a detector the registry does
    /// not know and [`DispatchError::DuplicateDetector`] for a detector bound twice.
    pub fn new(
        config: &DispatchConfig,
        detectors: Arc<dyn DetectorRegistry>,
        services: Arc<dyn ServiceRegistry>,
    ) -> Result<Self, DispatchError> {
        let mut verdicts = HashMap::with_capacity(config.bindings.len());
        let mut need_server_connect = false;
        let mut server_side = HashSet::new();

        for binding in &config.bindings {
            if verdicts.insert(binding.detector.clone(), VerdictState::Undecided).is_some() {
                return Err(DispatchError::DuplicateDetector {
                    detector: binding.detector.clone(),
                });
            }

            let detector = detectors.lookup(&binding.detector).ok_or_else(|| {
                DispatchError::NoSuchDetector {
                    detector: binding.detector.clone(),
                }
            })?;

            if detector.requires_server_side_protocol() {
                need_server_connect = true;
                server_side.insert(binding.detector.clone());
            }
        }

        Ok(Self {
            bindings: config.bindings.clone(),
            verdicts,
            server_side,
            default_service: config.default_service.clone(),
            timeout: config.timeout,
            need_server_connect,
            copy_client_data: None,
            quit: false,
            decision: None,
            session_id: String::from("-"),
            detectors,
            services,
        })
    }

    /// Tag log lines of this context with a session identifier
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Present the bytes buffered on `side` to every detector still in the race
    ///
    /// Detectors are asked in binding order. The first one to match decides the
    /// service and ends the pass. Detectors that already said no are skipped but
    /// still counted; once all of them said no the default service is chosen.
    ///
    /// After a decision has been made further calls return it without asking
    /// any detector.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when a detector or the selected service cannot
    /// be resolved.
    pub fn detect(&mut self, side: Side, data: &[u8]) -> Result<DetectOutcome, DispatchError> {
        if self.decision.is_some() {
            return Ok(self.outcome());
        }

        let mut nomatch_count = 0;

        for binding in &self.bindings {
            let state = self
                .verdicts
                .get_mut(&binding.detector)
                .ok_or_else(|| DispatchError::NoSuchDetector {
                    detector: binding.detector.clone(),
                })?;

            if *state == VerdictState::NoMatch {
                nomatch_count += 1;
                continue;
            }

            let detector = self.detectors.lookup(&binding.detector).ok_or_else(|| {
                DispatchError::NoSuchDetector {
                    detector: binding.detector.clone(),
                }
            })?;

            let verdict = detector.detect(side, data);
            *state = state.advance(verdict);

            match verdict {
                Verdict::Match => {
                    let service = self.services.lookup(&binding.service).ok_or_else(|| {
                        DispatchError::NoSuchService {
                            service: binding.service.clone(),
                        }
                    })?;
                    info!(
                        "{}: Detector starting service; detector='{}', service='{}'",
                        self.session_id, binding.detector, service
                    );
                    self.decision = Some(service);
                    return Ok(self.outcome());
                }
                Verdict::NoMatch => nomatch_count += 1,
                Verdict::CopyClient(bytes_to_copy) => {
                    self.need_server_connect = true;
                    self.copy_client_data = Some(bytes_to_copy);
                }
                Verdict::Undecided => {}
            }
        }

        if nomatch_count == self.bindings.len() {
            let service = self.lookup_default()?;
            info!("{}: Detector starting default service; service='{}'", self.session_id, service);
            self.quit = true;
            self.decision = Some(service);
        } else {
            debug!("{}: Detector still undecided; side='{}', bytes='{}'", self.session_id, side, data.len());
        }

        Ok(self.outcome())
    }

    /// Force the default service
    ///
    /// Used by the session host when detection cannot finish: the timeout
    /// expired or the client stopped sending. Behaves like running out of
    /// detectors. A context that already decided keeps its decision.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoSuchDefaultService`] when the default service
    /// is not installed.
    pub fn resolve_default(&mut self) -> Result<DetectOutcome, DispatchError> {
        if self.decision.is_none() {
            let service = self.lookup_default()?;
            info!("{}: Detection gave up, starting default service; service='{}'", self.session_id, service);
            self.quit = true;
            self.decision = Some(service);
        }
        Ok(self.outcome())
    }

    fn lookup_default(&self) -> Result<Arc<ServiceDescriptor>, DispatchError> {
        self.services
            .lookup(&self.default_service)
            .ok_or_else(|| DispatchError::NoSuchDefaultService {
                service: self.default_service.clone(),
            })
    }

    fn outcome(&self) -> DetectOutcome {
        DetectOutcome {
            service: self.decision.clone(),
            need_server_connect: self.need_server_connect,
            copy_client_data: self.copy_client_data,
            quit: self.quit,
        }
    }

    /// Recorded verdict of `detector`
    pub fn verdict(&self, detector: &str) -> Option<VerdictState> {
        self.verdicts.get(detector).copied()
    }

    /// Whether a detector still in the race wants to see server bytes
    ///
    /// False once a decision was made or every server-side detector said no.
    pub fn wants_server_data(&self) -> bool {
        if self.decision.is_some() {
            return false;
        }

        self.bindings.iter().any(|binding| match self.verdicts.get(&binding.detector) {
            Some(VerdictState::NoMatch) | None => false,
            Some(VerdictState::AwaitingServerData) => true,
            Some(_) => self.server_side.contains(&binding.detector),
        })
    }

    /// Detection budget the session host should enforce
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the session host must open the server side
    pub fn need_server_connect(&self) -> bool {
        self.need_server_connect
    }

    /// Client bytes a detector asked to have replayed to the server
    pub fn copy_client_data(&self) -> Option<usize> {
        self.copy_client_data
    }

    /// Whether the default service was forced
    pub fn quit(&self) -> bool {
        self.quit
    }

    /// The chosen service, once decided
    pub fn decision(&self) -> Option<&Arc<ServiceDescriptor>> {
        self.decision.as_ref()
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("session_id", &self.session_id)
            .field("bindings", &self.bindings)
            .field("verdicts", &self.verdicts)
            .field("default_service", &self.default_service)
            .field("need_server_connect", &self.need_server_connect)
            .field("copy_client_data", &self.copy_client_data)
            .field("quit", &self.quit)
            .field("decision", &self.decision.as_deref().map(ServiceDescriptor::name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::dispatch::{Detectors, Services};
    use crate::protocol::{Detector, MockDetector};
    use crate::service::ServiceKind;

    /// Detector replaying a fixed list of verdicts, `Undecided` once exhausted
    struct Scripted {
        verdicts: Mutex<VecDeque<Verdict>>,
        calls: AtomicUsize,
        server_side: bool,
    }

    impl Scripted {
        fn new(verdicts: &[Verdict]) -> Arc<Self> {
            Arc::new(Self {
                verdicts: Mutex::new(verdicts.iter().copied().collect()),
                calls: AtomicUsize::new(0),
                server_side: false,
            })
        }

        fn server_side(verdicts: &[Verdict]) -> Arc<Self> {
            Arc::new(Self {
                verdicts: Mutex::new(verdicts.iter().copied().collect()),
                calls: AtomicUsize::new(0),
                server_side: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Detector for Scripted {
        fn detect(&self, _side: Side, _data: &[u8]) -> Verdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Verdict::Undecided)
        }

        fn requires_server_side_protocol(&self) -> bool {
            self.server_side
        }
    }

    fn services() -> Arc<Services> {
        let mut services = Services::new();
        services
            .insert(ServiceDescriptor::new("web", ServiceKind::Reject))
            .insert(ServiceDescriptor::new("tunnel", ServiceKind::Reject))
            .insert(ServiceDescriptor::new("unknown", ServiceKind::Reject));
        Arc::new(services)
    }

    fn config() -> DispatchConfig {
        DispatchConfig::new(
            vec![
                DetectorBinding::new("http", "web"),
                DetectorBinding::new("tls", "tunnel"),
            ],
            "unknown",
        )
    }

    fn context(http: Arc<dyn Detector>, tls: Arc<dyn Detector>) -> DispatchContext {
        let mut detectors = Detectors::new();
        detectors.insert("http", http).insert("tls", tls);
        DispatchContext::new(&config(), Arc::new(detectors), services()).unwrap()
    }

    #[test]
    fn test_new_context_is_undecided() {
        let ctx = context(Scripted::new(&[]), Scripted::new(&[]));

        assert_eq!(ctx.verdict("http"), Some(VerdictState::Undecided));
        assert_eq!(ctx.verdict("tls"), Some(VerdictState::Undecided));
        assert_eq!(ctx.verdict("ssh"), None);
        assert_eq!(ctx.timeout(), Duration::from_millis(5000));
        assert!(!ctx.need_server_connect());
        assert!(!ctx.quit());
        assert!(ctx.decision().is_none());
    }

    #[test]
    fn test_first_match_in_order_wins() {
        let http = Scripted::new(&[Verdict::Match]);
        let tls = Scripted::new(&[Verdict::Match]);
        let mut ctx = context(http.clone(), tls.clone());

        let outcome = ctx.detect(Side::Client, b"GET ").unwrap();
        assert_eq!(outcome.service_id(), Some("web"));
        assert!(!outcome.quit);
        // The pass stopped at the winner
        assert_eq!(tls.calls(), 0);
        assert_eq!(ctx.verdict("tls"), Some(VerdictState::Undecided));
    }

    #[test]
    fn test_later_match_after_nomatch() {
        let http = Scripted::new(&[Verdict::Undecided, Verdict::NoMatch]);
        let tls = Scripted::new(&[Verdict::Undecided, Verdict::Match]);
        let mut ctx = context(http, tls);

        let outcome = ctx.detect(Side::Client, b"").unwrap();
        assert!(!outcome.is_decided());

        let outcome = ctx.detect(Side::Client, b"\x16\x03\x01").unwrap();
        assert_eq!(outcome.service_id(), Some("tunnel"));
        assert!(!outcome.quit);
        assert_eq!(ctx.verdict("http"), Some(VerdictState::NoMatch));
        assert_eq!(ctx.verdict("tls"), Some(VerdictState::Match));
    }

    #[test]
    fn test_all_nomatch_in_one_pass_selects_default() {
        let mut ctx = context(Scripted::new(&[Verdict::NoMatch]), Scripted::new(&[Verdict::NoMatch]));

        let outcome = ctx.detect(Side::Client, b"\x00\x01").unwrap();
        assert_eq!(outcome.service_id(), Some("unknown"));
        assert!(outcome.quit);
        assert!(ctx.quit());
    }

    #[test]
    fn test_nomatch_accumulates_across_calls() {
        let http = Scripted::new(&[Verdict::NoMatch]);
        let tls = Scripted::new(&[Verdict::Undecided, Verdict::Undecided, Verdict::NoMatch]);
        let mut ctx = context(http.clone(), tls);

        assert!(!ctx.detect(Side::Client, b"a").unwrap().is_decided());
        assert!(!ctx.detect(Side::Client, b"ab").unwrap().is_decided());
        let outcome = ctx.detect(Side::Client, b"abc").unwrap();

        assert_eq!(outcome.service_id(), Some("unknown"));
        assert!(outcome.quit);
        // Ruled out on the first call, never asked again
        assert_eq!(http.calls(), 1);
    }

    #[test]
    fn test_nomatch_detector_is_not_invoked_again() {
        let mut http = MockDetector::new();
        http.expect_requires_server_side_protocol().return_const(false);
        http.expect_detect().times(1).return_const(Verdict::NoMatch);

        let mut tls = MockDetector::new();
        tls.expect_requires_server_side_protocol().return_const(false);
        tls.expect_detect().times(3).return_const(Verdict::Undecided);

        let mut ctx = context(Arc::new(http), Arc::new(tls));
        for _ in 0..3 {
            let outcome = ctx.detect(Side::Client, b"x").unwrap();
            assert!(!outcome.is_decided());
        }
    }

    #[test]
    fn test_copy_client_requests_server_connection() {
        let http = Scripted::new(&[Verdict::CopyClient(12), Verdict::Undecided]);
        let tls = Scripted::new(&[]);
        let mut ctx = context(http, tls);

        let outcome = ctx.detect(Side::Client, b"EHLO example").unwrap();
        assert!(!outcome.is_decided());
        assert!(outcome.need_server_connect);
        assert_eq!(outcome.copy_client_data, Some(12));
        assert_eq!(ctx.verdict("http"), Some(VerdictState::AwaitingServerData));

        // Undecided does not demote a detector waiting for server bytes
        ctx.detect(Side::Server, b"").unwrap();
        assert_eq!(ctx.verdict("http"), Some(VerdictState::AwaitingServerData));
        assert_eq!(ctx.copy_client_data(), Some(12));
    }

    #[test]
    fn test_server_side_detector_requests_connection_at_construction() {
        let ctx = context(Scripted::new(&[]), Scripted::server_side(&[]));
        assert!(ctx.need_server_connect());
    }

    #[test]
    fn test_server_data_wanted_until_server_side_detector_gives_up() {
        let mut ctx = context(
            Scripted::new(&[Verdict::Undecided, Verdict::Undecided]),
            Scripted::server_side(&[Verdict::Undecided, Verdict::NoMatch]),
        );
        assert!(ctx.wants_server_data());

        ctx.detect(Side::Server, b"X").unwrap();
        assert!(ctx.wants_server_data());

        ctx.detect(Side::Server, b"XX").unwrap();
        assert_eq!(ctx.verdict("tls"), Some(VerdictState::NoMatch));
        assert!(!ctx.wants_server_data());
    }

    #[test]
    fn test_client_replay_request_wants_server_data() {
        let mut ctx = context(Scripted::new(&[Verdict::CopyClient(4)]), Scripted::new(&[]));
        assert!(!ctx.wants_server_data());

        ctx.detect(Side::Client, b"EHLO").unwrap();
        assert!(ctx.wants_server_data());
    }

    #[test]
    fn test_decision_is_sticky() {
        let http = Scripted::new(&[Verdict::Match]);
        let tls = Scripted::new(&[]);
        let mut ctx = context(http.clone(), tls.clone());

        ctx.detect(Side::Client, b"GET ").unwrap();
        let outcome = ctx.detect(Side::Client, b"GET /").unwrap();
        assert_eq!(outcome.service_id(), Some("web"));
        assert_eq!(http.calls(), 1);
        assert_eq!(tls.calls(), 0);

        let outcome = ctx.resolve_default().unwrap();
        assert_eq!(outcome.service_id(), Some("web"));
        assert!(!outcome.quit);
    }

    #[test]
    fn test_resolve_default_sets_quit() {
        let mut ctx = context(Scripted::new(&[]), Scripted::new(&[]));
        ctx.detect(Side::Client, b"").unwrap();

        let outcome = ctx.resolve_default().unwrap();
        assert_eq!(outcome.service_id(), Some("unknown"));
        assert!(outcome.quit);
    }

    #[test]
    fn test_missing_detector_fails_construction() {
        let mut detectors = Detectors::new();
        detectors.insert("http", Scripted::new(&[]) as Arc<dyn Detector>);
        let config = DispatchConfig::new(
            vec![DetectorBinding::new("http", "web"), DetectorBinding::new("bogus", "tunnel")],
            "unknown",
        );

        let err = DispatchContext::new(&config, Arc::new(detectors), services()).unwrap_err();
        assert_eq!(err, DispatchError::NoSuchDetector { detector: "bogus".to_string() });
    }

    #[test]
    fn test_duplicate_detector_fails_construction() {
        let mut detectors = Detectors::new();
        detectors.insert("http", Scripted::new(&[]) as Arc<dyn Detector>);
        let config = DispatchConfig::new(
            vec![DetectorBinding::new("http", "web"), DetectorBinding::new("http", "tunnel")],
            "unknown",
        );

        let err = DispatchContext::new(&config, Arc::new(detectors), services()).unwrap_err();
        assert_eq!(err, DispatchError::DuplicateDetector { detector: "http".to_string() });
    }

    #[test]
    fn test_missing_bound_service_fails_on_match() {
        let mut detectors = Detectors::new();
        detectors.insert("http", Scripted::new(&[Verdict::Match]) as Arc<dyn Detector>);
        let config = DispatchConfig::new(vec![DetectorBinding::new("http", "nowhere")], "unknown");
        let mut ctx = DispatchContext::new(&config, Arc::new(detectors), services()).unwrap();

        let err = ctx.detect(Side::Client, b"GET ").unwrap_err();
        assert_eq!(err, DispatchError::NoSuchService { service: "nowhere".to_string() });
    }

    #[test]
    fn test_missing_default_service_fails_on_exhaustion() {
        let mut detectors = Detectors::new();
        detectors.insert("http", Scripted::new(&[Verdict::NoMatch]) as Arc<dyn Detector>);
        let config = DispatchConfig::new(vec![DetectorBinding::new("http", "web")], "nowhere");
        let mut ctx = DispatchContext::new(&config, Arc::new(detectors), services()).unwrap();

        let err = ctx.detect(Side::Client, b"x").unwrap_err();
        assert_eq!(err, DispatchError::NoSuchDefaultService { service: "nowhere".to_string() });
    }

    #[test]
    fn test_no_bindings_selects_default_immediately() {
        let config = DispatchConfig::new(Vec::new(), "unknown");
        let mut ctx = DispatchContext::new(&config, Arc::new(Detectors::new()), services()).unwrap();

        let outcome = ctx.detect(Side::Client, b"").unwrap();
        assert_eq!(outcome.service_id(), Some("unknown"));
        assert!(outcome.quit);
    }
}
