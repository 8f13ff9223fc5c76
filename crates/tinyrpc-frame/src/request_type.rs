//! Request types carried in the last header byte.

use crate::error::FrameError;

/// Kind of exchange a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestType {
    /// Request/response call; the server answers with the same request id.
    ReqRes = 0,
    /// Publish/subscribe message. Received but never dispatched.
    SubPub = 1,
}

impl RequestType {
    /// Returns a human-readable name for the request type.
    pub fn name(self) -> &'static str {
        match self {
            RequestType::ReqRes => "req_res",
            RequestType::SubPub => "sub_pub",
        }
    }
}

impl From<RequestType> for u8 {
    fn from(value: RequestType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for RequestType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RequestType::ReqRes),
            1 => Ok(RequestType::SubPub),
            other => Err(FrameError::InvalidRequestType(other)),
        }
    }
}
