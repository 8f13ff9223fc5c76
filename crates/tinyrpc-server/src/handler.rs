//! Callables that can be registered as RPC methods.

/// A function callable with an argument tuple `Args`.
///
/// Implemented for every `Fn(A1, …, An) -> R` with `n` from 0 to 8, so plain
/// closures and `fn` items register directly. `Args` is the tuple the request
/// body is decoded into; it is fixed by the handler's signature when it is
/// registered.
pub trait Handler<Args>: Send + Sync + 'static {
    type Output;

    fn call(&self, args: Args) -> Self::Output;
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        impl<F, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> R + Send + Sync + 'static,
        {
            type Output = R;

            #[allow(non_snake_case)]
            fn call(&self, ($($ty,)*): ($($ty,)*)) -> R {
                (self)($($ty),*)
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);
impl_handler!(A1, A2, A3, A4, A5, A6, A7);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8);
