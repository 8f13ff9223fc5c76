use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::request_type::RequestType;

/// Frame header: body length (4) + request id (8) + request type (1) = 13 bytes.
pub const HEADER_SIZE: usize = 13;

/// Bodies of this size or larger are rejected: 10 MiB.
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Length of the body that follows, in bytes.
    pub body_len: u32,
    /// Correlation id chosen by the caller.
    pub req_id: u64,
    /// Exchange kind.
    pub req_type: RequestType,
}

impl Header {
    /// Create a header.
    pub fn new(body_len: u32, req_id: u64, req_type: RequestType) -> Self {
        Self {
            body_len,
            req_id,
            req_type,
        }
    }

    /// Encode into the fixed wire layout.
    ///
    /// ```text
    /// ┌──────────────┬──────────────┬──────────┐
    /// │ body_len     │ req_id       │ req_type │
    /// │ (4B LE)      │ (8B LE)      │ (1B)     │
    /// └──────────────┴──────────────┴──────────┘
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.body_len.to_le_bytes());
        out[4..12].copy_from_slice(&self.req_id.to_le_bytes());
        out[12] = self.req_type.into();
        out
    }

    /// Decode from the first 13 bytes of `src`.
    pub fn decode(mut src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::IncompleteHeader(src.len()));
        }
        let body_len = src.get_u32_le();
        let req_id = src.get_u64_le();
        let req_type = RequestType::try_from(src.get_u8())?;
        Ok(Self {
            body_len,
            req_id,
            req_type,
        })
    }

    /// A zero-length body marks a keepalive frame.
    pub fn is_keepalive(&self) -> bool {
        self.body_len == 0
    }
}

/// A framed message tagged with its request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlation id; responses carry the id of their request.
    pub req_id: u64,
    /// Exchange kind.
    pub req_type: RequestType,
    /// Serialized body. Empty for keepalives.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(req_id: u64, req_type: RequestType, body: impl Into<Bytes>) -> Self {
        Self {
            req_id,
            req_type,
            body: body.into(),
        }
    }

    /// Create a request/response frame.
    pub fn request(req_id: u64, body: impl Into<Bytes>) -> Self {
        Self::new(req_id, RequestType::ReqRes, body)
    }

    /// Create a keepalive frame (no body).
    pub fn keepalive(req_id: u64) -> Self {
        Self::new(req_id, RequestType::ReqRes, Bytes::new())
    }

    /// True if this frame carries no body.
    pub fn is_keepalive(&self) -> bool {
        self.body.is_empty()
    }

    /// Header describing this frame.
    ///
    /// Callers must have checked the body against [`MAX_FRAME_BYTES`], which
    /// keeps the length well inside `u32`.
    pub fn header(&self) -> Header {
        Header::new(self.body.len() as u32, self.req_id, self.req_type)
    }

    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Encode a frame into the wire format, header and body contiguous.
pub fn encode_frame(
    req_id: u64,
    req_type: RequestType,
    body: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    encode_frame_with_limit(req_id, req_type, body, dst, MAX_FRAME_BYTES)
}

pub(crate) fn encode_frame_with_limit(
    req_id: u64,
    req_type: RequestType,
    body: &[u8],
    dst: &mut BytesMut,
    max_frame_bytes: usize,
) -> Result<()> {
    if body.len() >= max_frame_bytes {
        return Err(FrameError::FrameTooLarge {
            size: body.len(),
            max: max_frame_bytes,
        });
    }
    let header = Header::new(body.len() as u32, req_id, req_type);
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_slice(&header.encode());
    dst.put_slice(body);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. A keepalive is
/// returned as a frame with an empty body.
pub fn decode_frame(src: &mut BytesMut, max_frame_bytes: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = Header::decode(&src[..HEADER_SIZE])?;
    let body_len = header.body_len as usize;
    if body_len >= max_frame_bytes {
        return Err(FrameError::FrameTooLarge {
            size: body_len,
            max: max_frame_bytes,
        });
    }

    if src.len() < HEADER_SIZE + body_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();

    Ok(Some(Frame {
        req_id: header.req_id,
        req_type: header.req_type,
        body,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Bodies of this many bytes or more are rejected. Default: 10 MiB.
    pub max_frame_bytes: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}
