//! Auto-Detect Gateway: protocol detection in front of TCP services
//!
//! The gateway listens on a single port, looks at the first bytes a client
//! (and, when needed, the upstream server) sends, and hands the connection to
//! the service bound to the first detector that recognises the protocol.
//! Connections no detector claims go to a default service.
//!
//! # Main Features
//!
//! - Ordered detector bindings with first-match-wins dispatch
//! - Built-in TLS, HTTP and server-banner detectors
//! - Replay of the bytes consumed during detection to the selected service
//! - Fallback to a default service on timeout or when every detector gives up
//!
//! # Example
//!
//! ```no_run
//! use auto_detect_gateway::{load_config, Gateway, Overrides, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = load_config(None, Overrides::default())?;
//!
//!     let gateway = Gateway::from_config(&config);
//!     gateway.run().await?;
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod proxy;
pub mod service;

// Re-export commonly used structures and functions for convenience
pub use common::{init_logger, parse_socket_addr, ProxyError, Result};
pub use config::{load_config, GatewayConfig, Overrides};
pub use dispatch::{DetectOutcome, DispatchConfig, DispatchContext, DispatchError};
pub use protocol::{Detector, Side, Verdict};
pub use proxy::Gateway;
pub use service::{ServiceDescriptor, ServiceKind};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
