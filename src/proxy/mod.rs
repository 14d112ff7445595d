//! Gateway module
//!
//! Accepts client connections, runs protocol detection on the first bytes of
//! each one, and starts the service the detector bindings select.

pub mod server;
mod handler;

pub use server::Gateway;
