//! Services and the session handoff
//!
//! After detection the session host builds a [`Session`] scoped to the chosen
//! service, inheriting the client stream and addressing of the original
//! connection plus a fresh instance identifier, and hands it to
//! [`start_service`].

mod descriptor;
mod session;
mod start;

pub use descriptor::{ServiceDescriptor, ServiceKind};
pub use session::{ClientConnection, InstanceIdGenerator, Session};
pub use start::{start_service, StartOptions};
