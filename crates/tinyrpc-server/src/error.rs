use tinyrpc_transport::TransportError;

/// Errors that can occur while starting or running a server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A worker runtime or thread could not be created.
    #[error("failed to start worker {index}: {source}")]
    Worker {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("worker pool size must be at least 1")]
    EmptyPool,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
