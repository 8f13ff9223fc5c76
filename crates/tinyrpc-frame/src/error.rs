/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header's request type byte is not a known [`crate::RequestType`].
    #[error("invalid request type {0:#04x}")]
    InvalidRequestType(u8),

    /// Fewer than 13 bytes were supplied where a header was expected.
    #[error("incomplete header ({0} bytes, need 13)")]
    IncompleteHeader(usize),

    /// The body length reaches or exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors that mean the peer broke the wire protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidRequestType(_)
                | FrameError::IncompleteHeader(_)
                | FrameError::FrameTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
