//! Small binary RPC over TCP.
//!
//! Every message is a 13-byte little-endian header (`body_len`, `req_id`,
//! `req_type`) followed by a MessagePack body. A server answers each request
//! with exactly one response carrying the same `req_id`; a client multiplexes
//! many concurrent calls over one connection by that id.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP bind, accept and connect-with-timeout
//! - [`frame`]: the 13-byte header and the streaming frame codec
//! - [`codec`]: MessagePack argument tuples and result envelopes
//! - [`server`]: worker pool, connection state machine, dispatch (behind `server` feature)
//! - [`client`]: multiplexing client (behind `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use tinyrpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use tinyrpc_frame::*;
}

/// Re-export payload codec types.
pub mod codec {
    pub use tinyrpc_codec::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use tinyrpc_server::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use tinyrpc_client::*;
}

#[cfg(feature = "client")]
pub use tinyrpc_client::{Client, ClientConfig, ClientError};
#[cfg(feature = "server")]
pub use tinyrpc_server::{Server, ServerConfig, ServerError, ServerHandle};
