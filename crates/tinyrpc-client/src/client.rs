use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Buf, Bytes};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tinyrpc_codec::{peek_result_code, unpack_reply, EncodeArgs, Reply, ResultCode};
use tinyrpc_frame::{Frame, FrameCodec, FrameError};
use tinyrpc_transport::{connect, resolve};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::pending::PendingCalls;

/// The live half of a connection: where requests go and who waits for them.
#[derive(Clone)]
struct Link {
    outbound: mpsc::UnboundedSender<Frame>,
    pending: Arc<PendingCalls>,
    cancel: CancellationToken,
}

impl Link {
    fn close(&self) {
        self.cancel.cancel();
        self.pending.fail_all();
    }
}

/// A multiplexing RPC client.
///
/// Network I/O runs on a small runtime owned by the client, so `Client` is a
/// plain blocking API: share it between threads with an `Arc` and call from
/// each of them. [`Client::call`], [`Client::try_connect`] and
/// [`CallFuture::wait`] block the calling thread and must not be used from
/// inside an async task; `.await` the [`CallFuture`] there instead. Dropping
/// the client shuts its runtime down, which is likewise not allowed inside an
/// async task.
///
/// There is no per-call timeout. A call waits until its response arrives or
/// the connection is lost.
pub struct Client {
    addr: String,
    config: ClientConfig,
    runtime: Runtime,
    next_id: AtomicU64,
    link: Mutex<Option<Link>>,
}

impl Client {
    /// Create an unconnected client for `addr` (`host:port`).
    pub fn new(addr: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tinyrpc-client")
            .enable_all()
            .build()
            .map_err(ClientError::Runtime)?;
        Ok(Self {
            addr: addr.into(),
            config,
            runtime,
            next_id: AtomicU64::new(0),
            link: Mutex::new(None),
        })
    }

    /// Create a client and connect within `config.connect_timeout`.
    pub fn connect_to(addr: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let client = Self::new(addr, config)?;
        client.try_connect(client.config.connect_timeout)?;
        Ok(client)
    }

    /// Server address this client connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connect, waiting at most `timeout`. Never retries.
    pub fn connect(&self, timeout: Duration) -> bool {
        match self.try_connect(timeout) {
            Ok(()) => true,
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "connect failed");
                false
            }
        }
    }

    /// Connect, waiting at most `timeout`, and report why it failed.
    ///
    /// An existing connection is closed first; its pending calls fail.
    pub fn try_connect(&self, timeout: Duration) -> Result<()> {
        let addr = resolve(&self.addr)?;
        let stream = self.runtime.block_on(connect(addr, timeout))?;
        let (read_half, write_half) = stream.into_split();

        let (outbound, queue) = mpsc::unbounded_channel();
        let link = Link {
            outbound,
            pending: Arc::new(PendingCalls::new()),
            cancel: CancellationToken::new(),
        };

        let reader = FramedRead::new(read_half, FrameCodec::with_config(self.config.frame_config()));
        self.runtime.spawn(read_loop(reader, link.clone()));
        self.runtime.spawn(write_loop(write_half, queue, link.clone()));
        if let Some(interval) = self.config.keepalive_interval {
            self.runtime.spawn(keepalive_loop(interval, link.clone()));
        }

        let previous = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(link);
        if let Some(previous) = previous {
            previous.close();
        }

        info!(%addr, "connected");
        Ok(())
    }

    /// True while the connection is up.
    pub fn is_connected(&self) -> bool {
        self.current_link()
            .is_some_and(|link| !link.cancel.is_cancelled())
    }

    /// Close the connection. Pending calls fail with
    /// [`ClientError::Disconnected`].
    pub fn close(&self) {
        let link = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(link) = link {
            link.close();
            debug!(addr = %self.addr, "connection closed by client");
        }
    }

    /// Call `method` and block until its response arrives.
    ///
    /// `args` is a tuple of arguments, `()` for none. A FAIL response becomes
    /// [`ClientError::Remote`]; a response that does not decode as `T`
    /// becomes [`ClientError::Codec`].
    pub fn call<T, A>(&self, method: &str, args: A) -> Result<T>
    where
        T: DeserializeOwned,
        A: EncodeArgs,
    {
        self.async_call(method, args).wait()
    }

    /// Send a call and return a handle to its response without blocking.
    ///
    /// The handle can be `.await`ed or [`wait`](CallFuture::wait)ed. Errors
    /// while sending are reported by the handle.
    pub fn async_call<T, A>(&self, method: &str, args: A) -> CallFuture<T>
    where
        T: DeserializeOwned,
        A: EncodeArgs,
    {
        match self.send_request(method, &args) {
            Ok((req_id, rx, pending)) => CallFuture {
                req_id,
                state: CallState::Waiting { rx, pending },
                _marker: PhantomData,
            },
            Err(e) => CallFuture {
                req_id: 0,
                state: CallState::Failed(Some(e)),
                _marker: PhantomData,
            },
        }
    }

    /// Send one keepalive frame.
    pub fn send_keepalive(&self) -> Result<()> {
        let link = self.current_link().ok_or(ClientError::NotConnected)?;
        link.outbound
            .send(Frame::keepalive(0))
            .map_err(|_| ClientError::Disconnected)
    }

    fn current_link(&self) -> Option<Link> {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn send_request<A: EncodeArgs>(
        &self,
        method: &str,
        args: &A,
    ) -> Result<(u64, oneshot::Receiver<Bytes>, Arc<PendingCalls>)> {
        let body = args.pack_request(method)?;
        if body.len() >= self.config.max_frame_bytes {
            return Err(FrameError::FrameTooLarge {
                size: body.len(),
                max: self.config.max_frame_bytes,
            }
            .into());
        }

        let link = self.current_link().ok_or(ClientError::NotConnected)?;
        let req_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = link.pending.register(req_id)?;
        if link.outbound.send(Frame::request(req_id, body)).is_err() {
            link.pending.cancel(req_id);
            return Err(ClientError::Disconnected);
        }
        trace!(req_id, method, "request queued");
        Ok((req_id, rx, link.pending))
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

enum CallState {
    Waiting {
        rx: oneshot::Receiver<Bytes>,
        pending: Arc<PendingCalls>,
    },
    Failed(Option<ClientError>),
    Done,
}

/// The response to one call.
///
/// Resolves once: `.await` it from async code or [`wait`](Self::wait) on it
/// from a plain thread. Dropping it stops waiting for the response.
#[must_use = "a call's response is lost unless the future is awaited or waited on"]
pub struct CallFuture<T> {
    req_id: u64,
    state: CallState,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> CallFuture<T> {
    /// Request id the call was sent with.
    pub fn req_id(&self) -> u64 {
        self.req_id
    }

    /// Block the current thread until the response arrives.
    pub fn wait(mut self) -> Result<T> {
        match std::mem::replace(&mut self.state, CallState::Done) {
            CallState::Waiting { rx, .. } => finish(rx.blocking_recv()),
            CallState::Failed(e) => Err(e.unwrap_or(ClientError::Disconnected)),
            CallState::Done => Err(ClientError::Disconnected),
        }
    }
}

impl<T: DeserializeOwned> Future for CallFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let received = match &mut this.state {
            CallState::Waiting { rx, .. } => match Pin::new(rx).poll(cx) {
                Poll::Ready(received) => received,
                Poll::Pending => return Poll::Pending,
            },
            CallState::Failed(e) => {
                let e = e.take().unwrap_or(ClientError::Disconnected);
                this.state = CallState::Done;
                return Poll::Ready(Err(e));
            }
            // Polled after completion.
            CallState::Done => return Poll::Pending,
        };
        this.state = CallState::Done;
        Poll::Ready(finish(received))
    }
}

impl<T> Drop for CallFuture<T> {
    fn drop(&mut self) {
        if let CallState::Waiting { pending, .. } = &self.state {
            pending.cancel(self.req_id);
        }
    }
}

fn finish<T: DeserializeOwned>(
    received: std::result::Result<Bytes, oneshot::error::RecvError>,
) -> Result<T> {
    let body = received.map_err(|_| ClientError::Disconnected)?;
    match unpack_reply::<T>(&body)? {
        Reply::Ok(value) => Ok(value),
        Reply::Fail(message) => Err(ClientError::Remote(message)),
    }
}

async fn read_loop(mut reader: FramedRead<OwnedReadHalf, FrameCodec>, link: Link) {
    loop {
        let next = tokio::select! {
            _ = link.cancel.cancelled() => break,
            next = reader.next() => next,
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(error = %e, "read failed");
                break;
            }
            None => {
                debug!("server closed the connection");
                break;
            }
        };
        if frame.is_keepalive() {
            continue;
        }

        let req_id = frame.req_id;
        if let Ok(ResultCode::Fail) = peek_result_code(&frame.body) {
            debug!(req_id, "server answered FAIL");
        }
        if !link.pending.complete(req_id, frame.body) {
            debug!(req_id, "response for unknown or abandoned request dropped");
        }
    }
    link.close();
}

async fn write_loop<W>(mut socket: W, mut queue: mpsc::UnboundedReceiver<Frame>, link: Link)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = link.cancel.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let header = frame.header().encode();
        let mut wire = header.as_slice().chain(frame.body);
        if let Err(e) = socket.write_all_buf(&mut wire).await {
            warn!(req_id = frame.req_id, error = %e, "write failed");
            break;
        }
    }
    link.close();
}

async fn keepalive_loop(period: Duration, link: Link) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = link.cancel.cancelled() => break,
            _ = ticker.tick() => {
                if link.outbound.send(Frame::keepalive(0)).is_err() {
                    break;
                }
                trace!("keepalive queued");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_keeps_each_caller_in_order() {
        const CALLERS: u64 = 4;
        const PER_CALLER: u64 = 250;

        let (outbound, queue) = mpsc::unbounded_channel();
        let link = Link {
            outbound,
            pending: Arc::new(PendingCalls::new()),
            cancel: CancellationToken::new(),
        };
        let (near, far) = tokio::io::duplex(1024);
        let writer = tokio::spawn(write_loop(near, queue, link.clone()));

        let callers: Vec<_> = (0..CALLERS)
            .map(|caller| {
                let outbound = link.outbound.clone();
                std::thread::spawn(move || {
                    for seq in 0..PER_CALLER {
                        let req_id = caller * 1_000 + seq;
                        outbound
                            .send(Frame::request(req_id, req_id.to_le_bytes().to_vec()))
                            .expect("writer should be running");
                    }
                })
            })
            .collect();

        let mut reader = FramedRead::new(far, FrameCodec::new());
        let mut next_seq = vec![0u64; CALLERS as usize];
        for _ in 0..CALLERS * PER_CALLER {
            let frame = reader
                .next()
                .await
                .expect("frame should arrive")
                .expect("frame should decode");
            let caller = (frame.req_id / 1_000) as usize;
            assert_eq!(frame.req_id % 1_000, next_seq[caller], "caller {caller} reordered");
            assert_eq!(frame.body.as_ref(), frame.req_id.to_le_bytes());
            next_seq[caller] += 1;
        }
        assert!(next_seq.iter().all(|&n| n == PER_CALLER));

        for caller in callers {
            caller.join().expect("caller thread should finish");
        }
        link.close();
        writer.await.expect("writer should exit");
    }
}
