//! Length-prefixed message framing with request-id correlation.
//!
//! Every message on a tinyrpc connection is framed with a fixed 13-byte
//! little-endian header:
//! - a 4-byte body length
//! - an 8-byte request id, echoed back on the response
//! - a 1-byte request type
//!
//! A zero-length body is a keepalive. Bodies of [`MAX_FRAME_BYTES`] or more
//! are a protocol violation and the connection must be dropped.

pub mod codec;
pub mod error;
pub mod framed;
pub mod request_type;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, Header, HEADER_SIZE, MAX_FRAME_BYTES,
};
pub use error::{FrameError, Result};
pub use framed::FrameCodec;
pub use request_type::RequestType;
