//! Payload codec for tinyrpc frame bodies.
//!
//! Bodies are MessagePack arrays:
//! - requests are `(method_name, arg_1, …, arg_n)`
//! - responses are `(result_code, [value])`, where a FAIL response carries
//!   the error message as its value
//!
//! Argument shapes are fixed by Rust types: [`EncodeArgs`] packs a tuple
//! behind the method name, [`DecodeArgs`] unpacks the exact tuple a handler
//! declared and reports a [`CodecError::Decode`] on any mismatch.

pub mod args;
pub mod envelope;
pub mod error;
pub mod msgpack;

pub use args::{DecodeArgs, EncodeArgs};
pub use envelope::{
    method_name, pack_fail, pack_ok, pack_ok_empty, peek_result_code, unpack_reply, Reply,
    ResultCode, FAIL_FALLBACK,
};
pub use error::{CodecError, Result};
pub use msgpack::{pack, unpack};
