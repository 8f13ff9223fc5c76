use tinyrpc_codec::CodecError;
use tinyrpc_frame::FrameError;
use tinyrpc_transport::TransportError;

/// Errors that can occur while connecting or calling.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The server answered with FAIL and this message.
    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("client is not connected")]
    NotConnected,

    /// The connection closed before the response arrived.
    #[error("connection lost")]
    Disconnected,

    #[error("failed to start client runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl ClientError {
    /// Message carried by a FAIL response, if this is one.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote(message) => Some(message),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
