//! Service start entry point
//!
//! Once detection picked a service the session host calls [`start_service`].
//! A `forward` service replays the client bytes buffered during detection to
//! its target and then relays data in both directions; a `reject` service
//! closes the client connection.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::io::{copy_bidirectional_with_sizes, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::common::{ProxyError, Result};
use super::descriptor::ServiceKind;
use super::session::Session;

/// Settings the built-in services need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// How long a forward service waits for its target to accept
    pub connect_timeout: Duration,
    /// Relay buffer size in bytes
    pub buffer_size: usize,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            buffer_size: 8192,
        }
    }
}

/// Start the service owning `session`
///
/// # Errors
///
/// Returns an error when the forward target cannot be reached in time or the
/// buffered client bytes cannot be replayed.
pub async fn start_service(mut session: Session, options: StartOptions) -> Result<()> {
    info!(
        "{}: Starting service; service='{}', instance='{}', client='{}'",
        session.session_id, session.service, session.instance_id, session.client_address
    );

    match session.service.kind().clone() {
        ServiceKind::Forward { target } => {
            let mut target_stream = timeout(options.connect_timeout, TcpStream::connect(target.as_str()))
                .await
                .map_err(|_| ProxyError::Service(format!("Connection to {} timed out", target)))?
                .map_err(|e| ProxyError::Service(format!("Failed to connect to {}: {}", target, e)))?;

            if !session.buffered.is_empty() {
                debug!("{}: Replaying {} buffered client bytes to {}", session.session_id, session.buffered.len(), target);
                target_stream.write_all(&session.buffered).await?;
            }

            // Each direction is shut down on its own EOF; the other keeps flowing
            match copy_bidirectional_with_sizes(
                &mut session.client_stream,
                &mut target_stream,
                options.buffer_size,
                options.buffer_size,
            )
            .await
            {
                Ok((up, down)) => info!(
                    "{}: Service finished; service='{}', client_to_target={}, target_to_client={}, duration={}ms",
                    session.session_id,
                    session.service.name(),
                    up + session.buffered.len() as u64,
                    down,
                    (Utc::now() - session.started_at).num_milliseconds()
                ),
                Err(e) => debug!(
                    "{}: Relay ended with error after {}ms: {}",
                    session.session_id,
                    (Utc::now() - session.started_at).num_milliseconds(),
                    e
                ),
            }
            Ok(())
        }
        ServiceKind::Reject => {
            info!("{}: Rejecting connection from {}", session.session_id, session.client_address);
            if let Err(e) = session.client_stream.shutdown().await {
                warn!("{}: Error closing rejected connection: {}", session.session_id, e);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use crate::service::{ClientConnection, ServiceDescriptor};

    // Helper function to create a connected pair of TCP streams
    async fn create_tcp_pair() -> (TcpStream, TcpStream, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_connect = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (server, peer) = listener.accept().await.unwrap();
        let client = client_connect.await.unwrap();

        (client, server, peer)
    }

    fn session(service: ServiceDescriptor, accepted: TcpStream, peer: std::net::SocketAddr, buffered: &'static [u8]) -> Session {
        let listen = accepted.local_addr().unwrap();
        let client = ClientConnection::new(accepted, listen, peer).unwrap();
        Session::new(Arc::new(service), client, "svc:0".to_string(), Bytes::from_static(buffered))
    }

    #[tokio::test]
    async fn test_forward_replays_buffered_bytes() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend.local_addr().unwrap();

        let (mut client, accepted, peer) = create_tcp_pair().await;
        let service = ServiceDescriptor::new(
            "web",
            ServiceKind::Forward { target: backend_addr.to_string() },
        );
        let session = session(service, accepted, peer, b"GET / HTTP/1.0\r\n");

        let running = tokio::spawn(start_service(session, StartOptions::default()));

        let (mut upstream, _) = backend.accept().await.unwrap();
        client.write_all(b"\r\n").await.unwrap();

        let mut received = vec![0u8; 18];
        upstream.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"GET / HTTP/1.0\r\n\r\n");

        upstream.write_all(b"HTTP/1.0 200 OK\r\n\r\n").await.unwrap();
        drop(upstream);

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(&response, b"HTTP/1.0 200 OK\r\n\r\n");

        drop(client);
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reject_closes_client() {
        let (mut client, accepted, peer) = create_tcp_pair().await;
        let session = session(ServiceDescriptor::new("unknown", ServiceKind::Reject), accepted, peer, b"");

        start_service(session, StartOptions::default()).await.unwrap();

        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_forward_to_closed_port_fails() {
        // Grab a free port, then close it again
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = unused.local_addr().unwrap();
        drop(unused);

        let (_client, accepted, peer) = create_tcp_pair().await;
        let service = ServiceDescriptor::new("web", ServiceKind::Forward { target: target.to_string() });
        let session = session(service, accepted, peer, b"");

        let result = start_service(session, StartOptions::default()).await;
        assert!(matches!(result, Err(ProxyError::Service(_))));
    }
}
