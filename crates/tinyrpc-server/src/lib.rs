//! tinyrpc server.
//!
//! A [`Server`] binds one TCP listener, spreads accepted connections over a
//! fixed [`WorkerPool`] of single-threaded runtimes, and answers each
//! request/response frame through a [`Router`] of typed handlers.
//!
//! ```no_run
//! use tinyrpc_server::{Server, ServerConfig};
//!
//! let mut server = Server::new(ServerConfig::default().with_bind_addr("127.0.0.1:9000"));
//! server
//!     .register("add", |a: i64, b: i64| a + b)
//!     .register("hello", |name: String| format!("Hello {name}"));
//! server.run()?;
//! # Ok::<(), tinyrpc_server::ServerError>(())
//! ```

mod connection;
mod registry;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod pool;
pub mod server;

pub use config::ServerConfig;
pub use dispatch::Router;
pub use error::{Result, ServerError};
pub use handler::Handler;
pub use pool::WorkerPool;
pub use server::{Server, ServerHandle, ShutdownSignal};
