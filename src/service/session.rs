//! Sessions handed over to the selected service

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::net::TcpStream;
use uuid::Uuid;

use super::descriptor::ServiceDescriptor;

/// Mints per-service instance identifiers (`"<service>:<n>"`)
///
/// One generator is shared by the whole gateway; counters start at 0 for
/// each service name.
#[derive(Debug, Default)]
pub struct InstanceIdGenerator {
    counters: Mutex<HashMap<String, u64>>,
}

impl InstanceIdGenerator {
    /// Create a generator with no counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Next instance identifier for `service_name`
    pub fn next(&self, service_name: &str) -> String {
        // A panic while holding the lock cannot leave a counter half-updated
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters.entry(service_name.to_string()).or_insert(0);
        let id = format!("{}:{}", service_name, counter);
        *counter += 1;
        id
    }
}

/// The accepted client connection, as known before a service is chosen
#[derive(Debug)]
pub struct ClientConnection {
    /// Identifier used in log lines for this connection
    pub session_id: Uuid,
    /// Client stream
    pub stream: TcpStream,
    /// Local address of the accepted socket
    pub local: SocketAddr,
    /// Address of the listener that accepted the connection
    pub listen: SocketAddr,
    /// Peer address of the client
    pub address: SocketAddr,
    /// When the connection was accepted
    pub accepted_at: DateTime<Utc>,
}

impl ClientConnection {
    /// Wrap an accepted stream
    pub fn new(stream: TcpStream, listen: SocketAddr, address: SocketAddr) -> std::io::Result<Self> {
        let local = stream.local_addr()?;
        Ok(Self {
            session_id: Uuid::new_v4(),
            stream,
            local,
            listen,
            address,
            accepted_at: Utc::now(),
        })
    }
}

/// A session scoped to the service that won detection
#[derive(Debug)]
pub struct Session {
    /// Service owning the session
    pub service: Arc<ServiceDescriptor>,
    /// Instance identifier derived from the service name
    pub instance_id: String,
    /// Connection-level identifier, inherited from the detection phase
    pub session_id: Uuid,
    /// Client stream
    pub client_stream: TcpStream,
    /// Local address of the accepted socket
    pub client_local: SocketAddr,
    /// Address of the listener that accepted the connection
    pub client_listen: SocketAddr,
    /// Peer address of the client
    pub client_address: SocketAddr,
    /// Client bytes read during detection, not yet delivered anywhere
    pub buffered: Bytes,
    /// When the service took over
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Build the session for `service` from the original client connection
    pub fn new(
        service: Arc<ServiceDescriptor>,
        client: ClientConnection,
        instance_id: String,
        buffered: Bytes,
    ) -> Self {
        Self {
            service,
            instance_id,
            session_id: client.session_id,
            client_stream: client.stream,
            client_local: client.local,
            client_listen: client.listen,
            client_address: client.address,
            buffered,
            started_at: Utc::now(),
        }
    }
}
