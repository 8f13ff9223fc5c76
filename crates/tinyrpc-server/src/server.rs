use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tinyrpc_codec::DecodeArgs;
use tinyrpc_transport::{configure_stream, TcpAcceptor};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionConfig, ConnectionState};
use crate::dispatch::Router;
use crate::error::Result;
use crate::handler::Handler;
use crate::pool::WorkerPool;
use crate::registry::Registry;

/// An RPC server in its registration phase.
///
/// Handlers are registered first; [`Server::start`] then freezes the dispatch
/// table and begins accepting connections.
pub struct Server {
    config: ServerConfig,
    router: Router,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register a handler. See [`Router::register`].
    pub fn register<H, Args>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: Handler<Args>,
        H::Output: Serialize + 'static,
        Args: DecodeArgs + 'static,
    {
        self.router.register(name, handler);
        self
    }

    /// Register a handler returning `Result`. See [`Router::register_fallible`].
    pub fn register_fallible<H, Args, T, E>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> &mut Self
    where
        H: Handler<Args, Output = std::result::Result<T, E>>,
        T: Serialize + 'static,
        E: fmt::Display + 'static,
        Args: DecodeArgs + 'static,
    {
        self.router.register_fallible(name, handler);
        self
    }

    /// Bind, start the workers and the sweeper, and begin accepting.
    ///
    /// Returns once the listener is bound; serving continues on the worker
    /// threads until the returned handle is shut down or dropped.
    pub fn start(self) -> Result<ServerHandle> {
        let acceptor = TcpAcceptor::bind(&self.config.bind_addr)?;
        let local_addr = acceptor.local_addr();

        let pool = WorkerPool::new(self.config.workers)?;
        let accept_worker = pool.acquire();
        let listener = {
            let _guard = accept_worker.enter();
            match acceptor.listen() {
                Ok(listener) => listener,
                Err(e) => {
                    pool.stop();
                    pool.join();
                    return Err(e.into());
                }
            }
        };

        let registry = Arc::new(Registry::new());
        let sweeper = CancellationToken::new();
        if self.config.sweep_interval.is_zero() {
            debug!("registry sweeper disabled");
        } else {
            pool.acquire().spawn(Arc::clone(&registry).sweep_loop(
                self.config.sweep_interval,
                sweeper.clone(),
            ));
        }

        let shared = Arc::new(Shared {
            router: Arc::new(self.router),
            registry: Arc::clone(&registry),
            pool: pool.clone(),
            connection: ConnectionConfig {
                idle_timeout: self.config.idle_timeout,
                frame: self.config.frame_config(),
            },
        });
        accept_worker.spawn(accept_loop(listener, shared));

        info!(
            %local_addr,
            workers = pool.size(),
            idle_timeout = ?self.config.idle_timeout,
            "server started"
        );

        Ok(ServerHandle {
            local_addr,
            signal: ShutdownSignal {
                pool,
                registry,
                sweeper,
            },
        })
    }

    /// Start and block until the server is shut down through a
    /// [`ShutdownSignal`].
    pub fn run(self) -> Result<()> {
        self.start()?.wait();
        Ok(())
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("router", &self.router)
            .finish()
    }
}

/// Everything the accept loop and connections need.
struct Shared {
    router: Arc<Router>,
    registry: Arc<Registry>,
    pool: WorkerPool,
    connection: ConnectionConfig,
}

impl Shared {
    /// Register `stream` and hand it to the next worker.
    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        configure_stream(&stream)?;
        let stream = stream.into_std()?;

        let (state, queue) = ConnectionState::new(self.registry.next_id(), peer);
        self.registry.insert(&state);

        let router = Arc::clone(&self.router);
        let config = self.connection.clone();
        self.pool.acquire().spawn(async move {
            match TcpStream::from_std(stream) {
                Ok(stream) => connection::serve(stream, state, queue, router, config).await,
                Err(e) => {
                    warn!(conn_id = state.id(), error = %e, "failed to register connection");
                    state.close();
                }
            }
        });
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // Not retried: the server stops accepting new connections.
                error!(error = %e, "accept failed, no longer accepting connections");
                return;
            }
        };
        if let Err(e) = shared.spawn_connection(stream, peer) {
            warn!(%peer, error = %e, "dropping accepted connection");
        }
    }
}

/// Stops a running server from any thread.
#[derive(Clone)]
pub struct ShutdownSignal {
    pool: WorkerPool,
    registry: Arc<Registry>,
    sweeper: CancellationToken,
}

impl ShutdownSignal {
    /// Stop the sweeper, close every connection and stop the workers.
    /// Connections are not drained. Idempotent, and safe to call from a
    /// handler running on a worker.
    pub fn shutdown(&self) {
        self.sweeper.cancel();
        self.registry.close_all();
        if !self.pool.is_stopped() {
            info!("server shutting down");
            self.pool.stop();
        }
    }

    /// True once [`ShutdownSignal::shutdown`] has run.
    pub fn is_shutdown(&self) -> bool {
        self.pool.is_stopped()
    }
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("stopped", &self.pool.is_stopped())
            .finish()
    }
}

/// A running server. Dropping the handle shuts the server down.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    signal: ShutdownSignal,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections tracked by the registry. Closed connections are counted
    /// until the next sweep.
    pub fn connection_count(&self) -> usize {
        self.signal.registry.len()
    }

    /// A cloneable handle that can stop the server from another thread.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Stop the server and wait for its threads to exit.
    pub fn shutdown(self) {
        self.signal.shutdown();
        self.signal.pool.join();
    }

    /// Block until the server is stopped through a [`ShutdownSignal`].
    pub fn wait(self) {
        self.signal.pool.join();
        self.signal.shutdown();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.signal.shutdown();
        self.signal.pool.join();
    }
}
