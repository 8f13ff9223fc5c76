//! Fixed pool of single-threaded event loops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ServerError};

/// A fixed set of OS threads, each driving its own current-thread tokio
/// runtime.
///
/// Every worker blocks on the pool's shutdown token, so an idle worker stays
/// alive until [`WorkerPool::stop`]. Work handed to a worker through
/// [`WorkerPool::acquire`] stays on that thread for its whole lifetime.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    handles: Vec<Handle>,
    next: AtomicUsize,
    shutdown: CancellationToken,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `size` workers. Fails on `size == 0` or if a runtime or thread
    /// cannot be created; workers already started are stopped again.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ServerError::EmptyPool);
        }

        let shutdown = CancellationToken::new();
        let mut handles = Vec::with_capacity(size);
        let mut threads = Vec::with_capacity(size);

        for index in 0..size {
            match spawn_worker(index, shutdown.clone()) {
                Ok((handle, thread)) => {
                    handles.push(handle);
                    threads.push(thread);
                }
                Err(source) => {
                    shutdown.cancel();
                    join_all(threads);
                    return Err(ServerError::Worker { index, source });
                }
            }
        }

        debug!(workers = size, "worker pool started");
        Ok(Self {
            inner: Arc::new(PoolInner {
                handles,
                next: AtomicUsize::new(0),
                shutdown,
                threads: Mutex::new(threads),
            }),
        })
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.inner.handles.len()
    }

    /// Next worker in circular order.
    pub fn acquire(&self) -> Handle {
        let index = self.inner.next.fetch_add(1, Ordering::Relaxed) % self.inner.handles.len();
        self.inner.handles[index].clone()
    }

    /// Signal every worker to exit. Tasks still running on a worker are
    /// dropped with its runtime.
    pub fn stop(&self) {
        self.inner.shutdown.cancel();
    }

    /// True once [`WorkerPool::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Wait for every worker thread to exit. Returns immediately if another
    /// caller already joined them.
    pub fn join(&self) {
        let threads = std::mem::take(
            &mut *self
                .inner
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        join_all(threads);
    }
}

fn spawn_worker(
    index: usize,
    shutdown: CancellationToken,
) -> std::io::Result<(Handle, JoinHandle<()>)> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let handle = runtime.handle().clone();
    let thread = thread::Builder::new()
        .name(format!("tinyrpc-worker-{index}"))
        .spawn(move || {
            runtime.block_on(shutdown.cancelled());
            debug!(worker = index, "worker stopped");
        })?;
    Ok((handle, thread))
}

fn join_all(threads: Vec<JoinHandle<()>>) {
    for thread in threads {
        if thread.join().is_err() {
            warn!("worker thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn zero_workers_is_an_error() {
        assert!(matches!(WorkerPool::new(0), Err(ServerError::EmptyPool)));
    }

    #[test]
    fn acquire_cycles_through_every_worker() {
        let pool = WorkerPool::new(3).expect("pool should start");
        let (tx, rx) = mpsc::channel();

        for _ in 0..6 {
            let tx = tx.clone();
            pool.acquire().spawn(async move {
                let name = thread::current().name().map(str::to_string);
                tx.send(name).expect("receiver should be alive");
            });
        }

        let mut seen = HashSet::new();
        for _ in 0..6 {
            let name = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("task should run")
                .expect("worker thread should be named");
            seen.insert(name);
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.contains("tinyrpc-worker-0"));

        pool.stop();
        pool.join();
    }

    #[test]
    fn idle_workers_stay_alive_until_stopped() {
        let pool = WorkerPool::new(2).expect("pool should start");
        thread::sleep(Duration::from_millis(50));

        let (tx, rx) = mpsc::channel();
        pool.acquire().spawn(async move {
            tx.send(()).expect("receiver should be alive");
        });
        rx.recv_timeout(Duration::from_secs(5))
            .expect("idle worker should still run tasks");

        assert!(!pool.is_stopped());
        pool.stop();
        pool.join();
        assert!(pool.is_stopped());
        // Joining twice is a no-op.
        pool.join();
    }
}
