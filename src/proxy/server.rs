//! Gateway server module
//!
//! Accepts client connections and runs protocol detection for each of them
//! on its own task.

use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::common::{ProxyError, Result};
use crate::config::GatewayConfig;
use crate::dispatch::{DetectorRegistry, Detectors, ServiceRegistry, Services};
use crate::service::{ClientConnection, InstanceIdGenerator};

use super::handler::{handle_connection, HandlerState};

/// Gateway server structure
///
/// Owns the listen address and the state shared by every connection: the
/// detector bindings, the installed detectors and services, and the instance
/// id counters.
pub struct Gateway {
    /// Listen address for the gateway
    listen_addr: SocketAddr,
    /// Shared per-connection state
    state: Arc<HandlerState>,
}

impl Gateway {
    /// Create a new gateway with explicit registries
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use auto_detect_gateway::config::GatewayConfig;
    /// # use auto_detect_gateway::dispatch::{Detectors, Services};
    /// # use auto_detect_gateway::proxy::Gateway;
    /// let config = GatewayConfig::default();
    /// let detectors = Arc::new(Detectors::from_config(&config.detectors));
    /// let services = Arc::new(Services::from_config(&config.services));
    /// let gateway = Gateway::new(&config, detectors, services);
    /// ```
    pub fn new(
        config: &GatewayConfig,
        detectors: Arc<dyn DetectorRegistry>,
        services: Arc<dyn ServiceRegistry>,
    ) -> Self {
        let state = HandlerState {
            dispatch: config.dispatch_config(),
            upstream: config.upstream.clone(),
            max_buffered: config.buffer_size,
            start_options: config.start_options(),
            detectors,
            services,
            instance_ids: InstanceIdGenerator::new(),
        };

        Self {
            listen_addr: config.listen,
            state: Arc::new(state),
        }
    }

    /// Create a gateway with the detectors and services defined in `config`
    pub fn from_config(config: &GatewayConfig) -> Self {
        let detectors = Detectors::from_config(&config.detectors);
        let services = Services::from_config(&config.services);

        info!(
            "Installed {} detectors and {} services",
            detectors.len(),
            services.len()
        );

        Self::new(config, Arc::new(detectors), Arc::new(services))
    }

    /// Configured listen address
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Bind the listen address and serve connections
    ///
    /// Runs until an error occurs.
    ///
    /// # Errors
    ///
    /// Returns an error if it cannot bind to the listen address.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await
            .map_err(ProxyError::Io)?;

        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Gateway started, listening on {}", local_addr);

        let mut tasks = JoinSet::new();

        loop {
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!("Task error: {}", e);
                }
            }

            match listener.accept().await {
                Ok((client_stream, client_addr)) => {
                    info!("Accepted connection from {}", client_addr);

                    let client = match ClientConnection::new(client_stream, local_addr, client_addr) {
                        Ok(client) => client,
                        Err(e) => {
                            error!("Error preparing connection from {}: {}", client_addr, e);
                            continue;
                        }
                    };

                    let state = Arc::clone(&self.state);

                    tasks.spawn(async move {
                        let session_id = client.session_id;
                        debug!("{}: Starting detection for {}", session_id, client_addr);

                        if let Err(e) = handle_connection(client, &state).await {
                            match e {
                                ProxyError::Dispatch(ref dispatch) => error!(
                                    "{}: Dispatch failed for '{}': {}",
                                    session_id,
                                    dispatch.identifier(),
                                    dispatch
                                ),
                                _ => error!("{}: Connection failed: {}", session_id, e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}
