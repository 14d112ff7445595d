//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

use crate::dispatch::DispatchError;

/// Auto-detect gateway error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Detector or service reference that cannot be resolved
    #[error("Dispatch configuration error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Error while starting or running the selected service
    #[error("Service error: {0}")]
    Service(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
