//! TCP transport for tinyrpc.
//!
//! The lowest layer of the workspace: binding a listener, resolving
//! endpoints and opening outbound connections with a bounded wait.
//! Everything else builds on the plain tokio streams returned here.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{configure_stream, connect, resolve, TcpAcceptor};
