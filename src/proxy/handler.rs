//! Connection handler module
//!
//! Drives auto-detection for a single client connection and hands the
//! connection to the service the dispatcher picked.

use std::io;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use chrono::Utc;
use log::{debug, info, warn};
use metrics::counter;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

use crate::common::{ProxyError, Result};
use crate::dispatch::{DetectOutcome, DetectorRegistry, DispatchConfig, DispatchContext, ServiceRegistry};
use crate::protocol::Side;
use crate::service::{start_service, ClientConnection, InstanceIdGenerator, Session, StartOptions};

/// Everything a connection handler needs, shared by all connections of a gateway
pub struct HandlerState {
    /// Detector bindings, default service and detection timeout
    pub dispatch: DispatchConfig,
    /// Server contacted when a detector needs server-side traffic
    pub upstream: Option<String>,
    /// Cap on the bytes buffered per side during detection
    pub max_buffered: usize,
    /// Built-in service settings; the connect timeout also bounds upstream connects
    pub start_options: StartOptions,
    /// Installed detectors
    pub detectors: Arc<dyn DetectorRegistry>,
    /// Installed services
    pub services: Arc<dyn ServiceRegistry>,
    /// Instance identifier source for new sessions
    pub instance_ids: InstanceIdGenerator,
}

/// Bytes and server connection gathered while the protocol is unknown
struct Detection {
    client_buf: BytesMut,
    server: Option<TcpStream>,
    server_buf: BytesMut,
    /// Client bytes already written to the server
    replayed: usize,
    /// Upstream connect was attempted (successfully or not)
    server_attempted: bool,
}

impl Detection {
    fn new(capacity: usize) -> Self {
        Self {
            client_buf: BytesMut::with_capacity(capacity),
            server: None,
            server_buf: BytesMut::new(),
            replayed: 0,
            server_attempted: false,
        }
    }

    fn buffer(&self, side: Side) -> &[u8] {
        match side {
            Side::Client => &self.client_buf,
            Side::Server => &self.server_buf,
        }
    }

    /// Act on the flags of a detection step: open the server side, replay client bytes
    async fn honour(&mut self, outcome: &DetectOutcome, state: &HandlerState, session_id: &str) -> Result<()> {
        if outcome.need_server_connect && !self.server_attempted {
            self.server_attempted = true;
            self.server = connect_upstream(state, session_id).await?;
        }

        let server = match self.server.as_mut() {
            Some(server) => server,
            None => return Ok(()),
        };

        if let Some(bytes_to_copy) = outcome.copy_client_data {
            let upto = bytes_to_copy.min(self.client_buf.len());
            if upto > self.replayed {
                debug!("{}: Copying client data to server; bytes='{}'", session_id, upto - self.replayed);
                server.write_all(&self.client_buf[self.replayed..upto]).await?;
                self.replayed = upto;
            }
        }

        Ok(())
    }
}

/// Connect to the configured upstream
///
/// An unreachable upstream is logged and leaves the server side closed;
/// detection then goes on with client data only.
async fn connect_upstream(state: &HandlerState, session_id: &str) -> Result<Option<TcpStream>> {
    let upstream = state.upstream.as_deref().ok_or_else(|| {
        ProxyError::Config("Detector needs server-side traffic but no upstream is configured".to_string())
    })?;

    match timeout(state.start_options.connect_timeout, TcpStream::connect(upstream)).await {
        Ok(Ok(stream)) => {
            debug!("{}: Connected to upstream {} for detection", session_id, upstream);
            Ok(Some(stream))
        }
        Ok(Err(e)) => {
            warn!("{}: Failed to connect to upstream {}: {}", session_id, upstream, e);
            Ok(None)
        }
        Err(_) => {
            warn!("{}: Connection to upstream {} timed out", session_id, upstream);
            Ok(None)
        }
    }
}

/// Wait for the next chunk from the client or, when connected, the server
///
/// Neither buffer grows past `limit`; callers stop reading a side whose
/// buffer is already full.
async fn read_next(
    client: &mut TcpStream,
    client_buf: &mut BytesMut,
    server: Option<&mut TcpStream>,
    server_buf: &mut BytesMut,
    limit: usize,
) -> (Side, io::Result<usize>) {
    let client_room = limit.saturating_sub(client_buf.len());
    let mut client_dst = BufMut::limit(client_buf, client_room);

    match server {
        Some(server) => {
            let server_room = limit.saturating_sub(server_buf.len());
            let mut server_dst = BufMut::limit(server_buf, server_room);
            tokio::select! {
                read = client.read_buf(&mut client_dst) => (Side::Client, read),
                read = server.read_buf(&mut server_dst) => (Side::Server, read),
            }
        }
        None => (Side::Client, client.read_buf(&mut client_dst).await),
    }
}

/// Handle a single client connection
///
/// Feeds client (and server) bytes to a fresh [`DispatchContext`] until it
/// picks a service, the detection timeout expires, or the client stops
/// sending. The latter two start the default service.
///
/// # Returns
///
/// Returns an error for dispatch configuration problems, I/O failures on the
/// client side, or when the selected service fails.
pub async fn handle_connection(mut client: ClientConnection, state: &HandlerState) -> Result<()> {
    let session_id = client.session_id.to_string();

    let mut ctx = DispatchContext::new(&state.dispatch, Arc::clone(&state.detectors), Arc::clone(&state.services))?
        .with_session_id(session_id.clone());

    let deadline = Instant::now() + ctx.timeout();
    let mut detection = Detection::new(state.max_buffered);

    let mut outcome = ctx.detect(Side::Client, &[])?;

    let service = loop {
        if let Some(service) = outcome.service.take() {
            break service;
        }

        detection.honour(&outcome, state, &session_id).await?;

        if detection.server.is_some() {
            if !ctx.wants_server_data() {
                debug!("{}: No detector needs server data any more, closing upstream", session_id);
                detection.server = None;
            } else if detection.server_buf.len() >= state.max_buffered {
                warn!("{}: Upstream sent {} bytes without a decision, closing upstream", session_id, detection.server_buf.len());
                detection.server = None;
            }
        }

        if detection.client_buf.len() >= state.max_buffered {
            warn!("{}: Detection buffer full without a decision; bytes='{}'", session_id, detection.client_buf.len());
            counter!("gateway.detect.fallbacks", "reason" => "buffer_full").increment(1);
            outcome = ctx.resolve_default()?;
            continue;
        }

        let read = read_next(
            &mut client.stream,
            &mut detection.client_buf,
            detection.server.as_mut(),
            &mut detection.server_buf,
            state.max_buffered,
        );

        match timeout_at(deadline, read).await {
            Err(_) => {
                info!("{}: Detection timed out after {:?}", session_id, ctx.timeout());
                counter!("gateway.detect.fallbacks", "reason" => "timeout").increment(1);
                outcome = ctx.resolve_default()?;
            }
            Ok((Side::Client, Ok(0))) => {
                debug!("{}: Client closed during detection", session_id);
                counter!("gateway.detect.fallbacks", "reason" => "client_closed").increment(1);
                outcome = ctx.resolve_default()?;
            }
            Ok((Side::Server, Ok(0))) => {
                debug!("{}: Upstream closed during detection", session_id);
                detection.server = None;
            }
            Ok((side, Ok(n))) => {
                debug!("{}: Read {} bytes from {}", session_id, n, side);
                outcome = ctx.detect(side, detection.buffer(side))?;
            }
            Ok((Side::Client, Err(e))) => return Err(ProxyError::Io(e)),
            Ok((Side::Server, Err(e))) => {
                warn!("{}: Error reading upstream during detection: {}", session_id, e);
                detection.server = None;
            }
        }
    };

    counter!("gateway.detect.decisions", "service" => service.name().to_string()).increment(1);
    debug!(
        "{}: Detection finished after {}ms; client_bytes='{}', server_bytes='{}'",
        session_id,
        (Utc::now() - client.accepted_at).num_milliseconds(),
        detection.client_buf.len(),
        detection.server_buf.len()
    );

    if detection.server.take().is_some() {
        debug!("{}: Dropping detection-time upstream connection", session_id);
    }

    let instance_id = state.instance_ids.next(service.name());
    let session = Session::new(service, client, instance_id, detection.client_buf.freeze());

    start_service(session, state.start_options).await
}
