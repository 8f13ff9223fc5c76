//! MessagePack via `rmp-serde`.
//!
//! Structs are packed with field names (`to_vec_named`) so peers can decode
//! them without sharing field order; tuples and sequences are arrays either
//! way.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Pack a value into MessagePack bytes.
#[inline]
pub fn pack<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Unpack MessagePack bytes into `T`, failing if the shape does not match.
#[inline]
pub fn unpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::error::CodecError;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn tuple_packs_as_array() {
        let bytes = pack(&(1u8, "a")).unwrap();
        // fixarray(2), positive fixint 1, fixstr "a"
        assert_eq!(bytes, vec![0x92, 0x01, 0xa1, b'a']);
    }

    #[test]
    fn struct_survives_pack_unpack() {
        let point = Point { x: 3, y: -4 };
        let bytes = pack(&point).unwrap();
        assert_eq!(unpack::<Point>(&bytes).unwrap(), point);
    }

    #[test]
    fn type_mismatch_is_decode_error() {
        let bytes = pack(&("not a number",)).unwrap();
        assert!(matches!(
            unpack::<(i64,)>(&bytes),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(matches!(
            unpack::<(String,)>(&[0xc1]),
            Err(CodecError::Decode(_))
        ));
    }
}
