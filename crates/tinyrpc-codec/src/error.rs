/// Errors that can occur while packing or unpacking payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("pack failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The bytes do not match the expected shape.
    #[error("unpack failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
