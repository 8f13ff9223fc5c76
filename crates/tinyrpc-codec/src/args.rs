//! Argument tuples behind a method name.
//!
//! A request body is one flat array: the method name first, then each
//! argument. Handlers and callers agree on the argument shape through a Rust
//! tuple type, arity 0 through 8.

use serde::de::DeserializeOwned;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::msgpack::{pack, unpack};

/// Values that can be packed as call arguments after a method name.
///
/// Implemented for tuples of up to eight [`Serialize`] values and for
/// `Vec<T>`, which is treated as an argument *list* (each element becomes one
/// argument). To pass a vector as a single argument, wrap it: `(vec,)`.
pub trait EncodeArgs {
    /// Pack `(method, args…)` into a request body.
    fn pack_request(&self, method: &str) -> Result<Vec<u8>>;
}

/// Argument tuples a handler can unpack from a request body.
pub trait DecodeArgs: Sized {
    /// Number of arguments the tuple holds.
    const ARITY: usize;

    /// Unpack the arguments, skipping the leading method name. The body must
    /// hold exactly `ARITY` values after the name.
    fn unpack_request(body: &[u8]) -> Result<Self>;
}

macro_rules! impl_args {
    ($arity:expr; $($ty:ident $idx:tt),*) => {
        impl<$($ty: Serialize,)*> EncodeArgs for ($($ty,)*) {
            fn pack_request(&self, method: &str) -> Result<Vec<u8>> {
                pack(&(method, $(&self.$idx,)*))
            }
        }

        impl<$($ty: DeserializeOwned,)*> DecodeArgs for ($($ty,)*) {
            const ARITY: usize = $arity;

            #[allow(non_snake_case)]
            fn unpack_request(body: &[u8]) -> Result<Self> {
                let (_method, $($ty,)*): (String, $($ty,)*) = unpack(body)?;
                Ok(($($ty,)*))
            }
        }
    };
}

impl_args!(0;);
impl_args!(1; A1 0);
impl_args!(2; A1 0, A2 1);
impl_args!(3; A1 0, A2 1, A3 2);
impl_args!(4; A1 0, A2 1, A3 2, A4 3);
impl_args!(5; A1 0, A2 1, A3 2, A4 3, A5 4);
impl_args!(6; A1 0, A2 1, A3 2, A4 3, A5 4, A6 5);
impl_args!(7; A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6);
impl_args!(8; A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6, A8 7);

impl<T: Serialize> EncodeArgs for Vec<T> {
    fn pack_request(&self, method: &str) -> Result<Vec<u8>> {
        pack(&FlatRequest { method, args: self })
    }
}

/// `(method, args[0], args[1], …)` as one array.
struct FlatRequest<'a, T> {
    method: &'a str,
    args: &'a [T],
}

impl<T: Serialize> Serialize for FlatRequest<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.args.len() + 1))?;
        seq.serialize_element(self.method)?;
        for arg in self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}
