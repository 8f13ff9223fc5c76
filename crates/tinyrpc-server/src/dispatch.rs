//! Method dispatch table.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tinyrpc_codec::{method_name, pack_fail, pack_ok, pack_ok_empty, DecodeArgs, FAIL_FALLBACK};
use tracing::{debug, warn};

use crate::handler::Handler;

/// Type-erased entry: request body in, packed OK envelope or failure text out.
type Route = Box<dyn Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync>;

/// Name → handler table.
///
/// Populated before serving starts, then shared read-only between workers.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous entry.
    ///
    /// The request body is decoded as `(String, Args…)` according to the
    /// handler's own signature. A handler returning `()` answers `(OK)`, any
    /// other return value answers `(OK, value)`.
    pub fn register<H, Args>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: Handler<Args>,
        H::Output: Serialize + 'static,
        Args: DecodeArgs + 'static,
    {
        let route: Route = if TypeId::of::<H::Output>() == TypeId::of::<()>() {
            Box::new(move |body| {
                let args = Args::unpack_request(body).map_err(|e| e.to_string())?;
                handler.call(args);
                pack_ok_empty().map_err(|e| e.to_string())
            })
        } else {
            Box::new(move |body| {
                let args = Args::unpack_request(body).map_err(|e| e.to_string())?;
                pack_ok(&handler.call(args)).map_err(|e| e.to_string())
            })
        };
        self.insert(name.into(), route);
        self
    }

    /// Register a handler returning `Result<T, E>`; `Err(e)` answers
    /// `(FAIL, e.to_string())`.
    pub fn register_fallible<H, Args, T, E>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> &mut Self
    where
        H: Handler<Args, Output = Result<T, E>>,
        T: Serialize + 'static,
        E: fmt::Display + 'static,
        Args: DecodeArgs + 'static,
    {
        let route: Route = Box::new(move |body| {
            let args = Args::unpack_request(body).map_err(|e| e.to_string())?;
            let value = handler.call(args).map_err(|e| e.to_string())?;
            pack_ok(&value).map_err(|e| e.to_string())
        });
        self.insert(name.into(), route);
        self
    }

    fn insert(&mut self, name: String, route: Route) {
        if self.routes.insert(name.clone(), route).is_some() {
            warn!(method = %name, "handler replaced by a later registration");
        }
    }

    /// True if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Registered method names, unordered.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Answer one request body. Never fails: every outcome, including an
    /// unknown method, a decode mismatch or a handler panic, is packed into a
    /// response envelope.
    pub fn route(&self, body: &[u8]) -> Vec<u8> {
        let name = match method_name(body) {
            Ok(name) => name,
            Err(e) => {
                debug!(error = %e, "request body has no method name");
                return fail(&e.to_string());
            }
        };

        let Some(route) = self.routes.get(&name) else {
            debug!(method = %name, "unknown method");
            return fail(&format!("unknown function: {name}"));
        };

        match panic::catch_unwind(AssertUnwindSafe(|| route(body))) {
            Ok(Ok(response)) => response,
            Ok(Err(message)) => {
                debug!(method = %name, error = %message, "handler failed");
                fail(&message)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(method = %name, error = %message, "handler panicked");
                fail(&message)
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn fail(message: &str) -> Vec<u8> {
    pack_fail(message).unwrap_or_else(|e| {
        warn!(error = %e, "failed to pack FAIL response");
        FAIL_FALLBACK.to_vec()
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
