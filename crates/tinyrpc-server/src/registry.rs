//! Connection registry and its sweeper task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::ConnectionState;

#[derive(Default)]
struct Inner {
    next_id: u64,
    connections: HashMap<u64, Weak<ConnectionState>>,
}

impl Inner {
    fn evict_closed(&mut self) -> usize {
        let before = self.connections.len();
        self.connections
            .retain(|_, conn| conn.upgrade().is_some_and(|conn| !conn.is_closed()));
        before - self.connections.len()
    }
}

/// Live connections by id. The id counter shares the same lock.
#[derive(Default)]
pub(crate) struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next connection id; ids start at 1.
    pub(crate) fn next_id(&self) -> u64 {
        let mut inner = self.lock();
        inner.next_id += 1;
        inner.next_id
    }

    pub(crate) fn insert(&self, conn: &Arc<ConnectionState>) {
        self.lock().connections.insert(conn.id(), Arc::downgrade(conn));
    }

    /// Entries currently tracked, including closed ones not yet swept.
    pub(crate) fn len(&self) -> usize {
        self.lock().connections.len()
    }

    /// Drop entries whose connection is closed or already gone.
    pub(crate) fn sweep(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.evict_closed();
        if removed > 0 {
            debug!(removed, remaining = inner.connections.len(), "swept closed connections");
        }
        removed
    }

    /// Close every tracked connection and forget them.
    pub(crate) fn close_all(&self) {
        let connections: Vec<_> = self.lock().connections.drain().collect();
        for (_, conn) in connections {
            if let Some(conn) = conn.upgrade() {
                conn.close();
            }
        }
    }

    /// Sweep every `period` until `stop` is cancelled.
    pub(crate) async fn sweep_loop(self: Arc<Self>, period: Duration, stop: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => {
                    self.sweep();
                }
            }
        }
        debug!("sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use super::*;

    fn conn(registry: &Registry) -> Arc<ConnectionState> {
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000);
        let (state, _queue) = ConnectionState::new(registry.next_id(), peer);
        registry.insert(&state);
        state
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let registry = Registry::new();
        assert_eq!(registry.next_id(), 1);
        assert_eq!(registry.next_id(), 2);
    }

    #[test]
    fn sweep_evicts_closed_and_dropped() {
        let registry = Registry::new();
        let open = conn(&registry);
        let closed = conn(&registry);
        let dropped = conn(&registry);
        assert_eq!(registry.len(), 3);

        closed.close();
        drop(dropped);
        assert_eq!(registry.sweep(), 2);
        assert_eq!(registry.len(), 1);
        assert!(!open.is_closed());
    }

    #[tokio::test]
    async fn sweeper_runs_periodically_and_stops() {
        let registry = Arc::new(Registry::new());
        let closed = conn(&registry);
        closed.close();

        let stop = CancellationToken::new();
        let sweeper = tokio::spawn(Arc::clone(&registry).sweep_loop(
            Duration::from_millis(20),
            stop.clone(),
        ));

        let swept = tokio::time::timeout(Duration::from_secs(5), async {
            while registry.len() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(swept.is_ok(), "closed entry should be swept");

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(5), sweeper)
            .await
            .expect("sweeper should stop once cancelled")
            .expect("sweeper should exit cleanly");
    }

    #[test]
    fn close_all_closes_live_connections() {
        let registry = Registry::new();
        let a = conn(&registry);
        let b = conn(&registry);
        registry.close_all();
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(registry.len(), 0);
    }
}
