//! tinyrpc client.
//!
//! A [`Client`] owns one TCP connection and multiplexes any number of
//! concurrent calls over it. Each call gets a fresh request id; a writer task
//! sends requests in FIFO order and a reader task hands every response to the
//! call waiting on its id.
//!
//! ```no_run
//! use tinyrpc_client::{Client, ClientConfig};
//!
//! let client = Client::connect_to("127.0.0.1:9000", ClientConfig::default())?;
//! let sum: i64 = client.call("add", (2i64, 3i64))?;
//! let greeting = client.async_call::<String, _>("hello", ("World",));
//! assert_eq!(sum, 5);
//! assert_eq!(greeting.wait()?, "Hello World");
//! # Ok::<(), tinyrpc_client::ClientError>(())
//! ```

mod pending;

pub mod client;
pub mod config;
pub mod error;

pub use client::{CallFuture, Client};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
