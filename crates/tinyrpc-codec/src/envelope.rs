//! Response envelopes and request peeking.

use std::fmt;
use std::marker::PhantomData;

use serde::de::value::UnitDeserializer;
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, IntoDeserializer, SeqAccess, Visitor};
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::msgpack::{pack, unpack};

/// MessagePack for `[1, ""]`: a FAIL envelope with an empty message.
///
/// Used when even the FAIL envelope cannot be packed.
pub const FAIL_FALLBACK: &[u8] = &[0x92, 0x01, 0xa0];

/// First element of every response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok = 0,
    Fail = 1,
}

impl ResultCode {
    /// Numeric wire value.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Map a wire value back, if known.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Fail),
            _ => None,
        }
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for ResultCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| de::Error::custom(format_args!("unknown result code {code}")))
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

/// Pack `(OK, value)`.
pub fn pack_ok<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    pack(&(ResultCode::Ok, value))
}

/// Pack `(OK)` for handlers that return nothing.
pub fn pack_ok_empty() -> Result<Vec<u8>> {
    pack(&(ResultCode::Ok,))
}

/// Pack `(FAIL, message)`.
pub fn pack_fail(message: &str) -> Result<Vec<u8>> {
    pack(&(ResultCode::Fail, message))
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Ok(T),
    Fail(String),
}

impl<T> Reply<T> {
    /// Convert into a `Result`, keeping the remote message on failure.
    pub fn into_result(self) -> std::result::Result<T, String> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Fail(message) => Err(message),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Reply<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_seq(ReplyVisitor(PhantomData))
    }
}

struct ReplyVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for ReplyVisitor<T> {
    type Value = Reply<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a (result_code, value) array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let code: ResultCode = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let reply = match code {
            // `(OK)` with no value decodes as unit, so `()` and `Option<_>`
            // callers accept it.
            ResultCode::Ok => match seq.next_element::<T>()? {
                Some(value) => Reply::Ok(value),
                None => {
                    let unit: UnitDeserializer<A::Error> = ().into_deserializer();
                    Reply::Ok(T::deserialize(unit)?)
                }
            },
            ResultCode::Fail => Reply::Fail(seq.next_element::<String>()?.unwrap_or_default()),
        };
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(reply)
    }
}

/// Unpack a response body into a [`Reply`].
pub fn unpack_reply<T: de::DeserializeOwned>(body: &[u8]) -> Result<Reply<T>> {
    unpack(body)
}

/// Read only the result code of a response body.
pub fn peek_result_code(body: &[u8]) -> Result<ResultCode> {
    Ok(unpack::<Leading<ResultCode>>(body)?.0)
}

/// Read only the method name of a request body, ignoring the arguments.
pub fn method_name(body: &[u8]) -> Result<String> {
    Ok(unpack::<Leading<String>>(body)?.0)
}

/// The first element of an array; the rest is skipped.
struct Leading<T>(T);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Leading<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LeadingVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for LeadingVisitor<T> {
            type Value = Leading<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-empty array")
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let first = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(Leading(first))
            }
        }

        deserializer.deserialize_seq(LeadingVisitor(PhantomData))
    }
}
