//! tokio-util codec for streaming frames off a socket.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{encode_frame_with_limit, Frame, FrameConfig, Header, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Where the decoder is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingHeader,
    ReadingBody(Header),
}

/// Streaming frame codec.
///
/// Decoding is a two-state machine: a header is parsed and validated as soon
/// as its 13 bytes arrive, then exactly `body_len` bytes are awaited. An
/// oversized or malformed header fails immediately, before any body bytes
/// are buffered.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    state: DecodeState,
    config: FrameConfig,
}

impl FrameCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            state: DecodeState::AwaitingHeader,
            config,
        }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// True while a header has been consumed and its body is still pending.
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, DecodeState::ReadingBody(_))
    }

    fn decode_header(&mut self, src: &mut BytesMut) -> Result<Option<Header>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        let header = Header::decode(&src[..HEADER_SIZE])?;
        let body_len = header.body_len as usize;
        if body_len >= self.config.max_frame_bytes {
            return Err(FrameError::FrameTooLarge {
                size: body_len,
                max: self.config.max_frame_bytes,
            });
        }
        src.advance(HEADER_SIZE);
        src.reserve(body_len);
        Ok(Some(header))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let header = match self.state {
            DecodeState::AwaitingHeader => match self.decode_header(src)? {
                Some(header) if header.is_keepalive() => {
                    trace!(req_id = header.req_id, "keepalive frame");
                    return Ok(Some(Frame::new(
                        header.req_id,
                        header.req_type,
                        bytes::Bytes::new(),
                    )));
                }
                Some(header) => {
                    self.state = DecodeState::ReadingBody(header);
                    header
                }
                None => return Ok(None),
            },
            DecodeState::ReadingBody(header) => header,
        };

        let body_len = header.body_len as usize;
        if src.len() < body_len {
            return Ok(None);
        }

        self.state = DecodeState::AwaitingHeader;
        let body = src.split_to(body_len).freeze();
        Ok(Some(Frame {
            req_id: header.req_id,
            req_type: header.req_type,
            body,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && !self.is_mid_frame() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame_with_limit(
            frame.req_id,
            frame.req_type,
            frame.body.as_ref(),
            dst,
            self.config.max_frame_bytes,
        )
    }
}
