//! Calls waiting for a response, keyed by request id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{ClientError, Result};

struct Inner {
    calls: HashMap<u64, oneshot::Sender<Bytes>>,
    open: bool,
}

/// Pending calls of one connection.
///
/// Once the connection ends, [`PendingCalls::fail_all`] drops every sender,
/// which wakes each waiter with a closed channel, and refuses new entries.
pub(crate) struct PendingCalls {
    inner: Mutex<Inner>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                calls: HashMap::new(),
                open: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start waiting for `req_id`.
    pub(crate) fn register(&self, req_id: u64) -> Result<oneshot::Receiver<Bytes>> {
        let mut inner = self.lock();
        if !inner.open {
            return Err(ClientError::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        inner.calls.insert(req_id, tx);
        Ok(rx)
    }

    /// Deliver a response body. Returns false if nobody waits for `req_id`.
    pub(crate) fn complete(&self, req_id: u64, body: Bytes) -> bool {
        let sender = self.lock().calls.remove(&req_id);
        match sender {
            Some(sender) => sender.send(body).is_ok(),
            None => false,
        }
    }

    /// Stop waiting for `req_id`.
    pub(crate) fn cancel(&self, req_id: u64) {
        self.lock().calls.remove(&req_id);
    }

    /// Wake every waiter with a closed channel and refuse new calls.
    pub(crate) fn fail_all(&self) {
        let calls = {
            let mut inner = self.lock();
            inner.open = false;
            std::mem::take(&mut inner.calls)
        };
        drop(calls);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_wakes_the_matching_waiter() {
        let pending = PendingCalls::new();
        let mut first = pending.register(1).expect("register should succeed");
        let mut second = pending.register(2).expect("register should succeed");

        assert!(pending.complete(2, Bytes::from_static(b"two")));
        assert_eq!(second.try_recv().expect("second should be ready"), "two");
        assert!(first.try_recv().is_err());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn unknown_id_is_not_delivered() {
        let pending = PendingCalls::new();
        assert!(!pending.complete(42, Bytes::new()));
    }

    #[test]
    fn cancelled_call_is_forgotten() {
        let pending = PendingCalls::new();
        let _rx = pending.register(1).expect("register should succeed");
        pending.cancel(1);
        assert!(!pending.complete(1, Bytes::new()));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn fail_all_closes_waiters_and_refuses_new_calls() {
        let pending = PendingCalls::new();
        let rx = pending.register(1).expect("register should succeed");
        pending.fail_all();

        assert!(rx.blocking_recv().is_err());
        assert!(matches!(pending.register(2), Err(ClientError::Disconnected)));
    }
}
