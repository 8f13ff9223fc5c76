//! Per-connection reactor: read loop, dispatch tasks and a single writer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tinyrpc_codec::FAIL_FALLBACK;
use tinyrpc_frame::{Frame, FrameCodec, FrameConfig, FrameError, RequestType};
use tokio::io::AsyncWrite;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::dispatch::{self, Router};

/// State shared between a connection's tasks and the server registry.
pub(crate) struct ConnectionState {
    id: u64,
    peer: SocketAddr,
    closed: AtomicBool,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl ConnectionState {
    /// Create the shared state and the receiving end of its write queue.
    pub(crate) fn new(id: u64, peer: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<Frame>) {
        let (outbound, queue) = mpsc::unbounded_channel();
        let state = Arc::new(Self {
            id,
            peer,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            outbound,
        });
        (state, queue)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the connection. Only the first call has any effect.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cancel.cancel();
            debug!(conn_id = self.id, peer = %self.peer, "connection closing");
        }
    }

    /// Queue a frame for the writer. Safe from any thread; dropped once the
    /// connection is closed.
    pub(crate) fn enqueue(&self, frame: Frame) {
        if self.is_closed() || self.outbound.send(frame).is_err() {
            trace!(conn_id = self.id, "dropping response for closed connection");
        }
    }
}

/// Settings every connection on a server shares.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionConfig {
    pub idle_timeout: Duration,
    pub frame: FrameConfig,
}

/// Drive one accepted connection until it closes.
pub(crate) async fn serve(
    stream: TcpStream,
    state: Arc<ConnectionState>,
    queue: mpsc::UnboundedReceiver<Frame>,
    router: Arc<Router>,
    config: ConnectionConfig,
) {
    info!(conn_id = state.id, peer = %state.peer, "connection accepted");

    let (read_half, write_half) = stream.into_split();
    let reader = FramedRead::new(read_half, FrameCodec::with_config(config.frame.clone()));
    let writer = FramedWrite::new(write_half, FrameCodec::with_config(config.frame.clone()));

    let write_task = tokio::spawn(write_loop(writer, queue, Arc::clone(&state)));
    read_loop(reader, &state, &router, &config).await;

    state.close();
    if write_task.await.is_err() {
        warn!(conn_id = state.id, "writer task aborted");
    }
    info!(conn_id = state.id, peer = %state.peer, "connection closed");
}

enum ReadOutcome {
    Frame(Frame),
    Eof,
    Idle,
    Failed(FrameError),
}

async fn next_frame(
    reader: &mut FramedRead<OwnedReadHalf, FrameCodec>,
    idle_timeout: Duration,
) -> ReadOutcome {
    let next = if idle_timeout.is_zero() {
        reader.next().await
    } else {
        match tokio::time::timeout(idle_timeout, reader.next()).await {
            Ok(next) => next,
            Err(_) => return ReadOutcome::Idle,
        }
    };
    match next {
        Some(Ok(frame)) => ReadOutcome::Frame(frame),
        Some(Err(e)) => ReadOutcome::Failed(e),
        None => ReadOutcome::Eof,
    }
}

async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, FrameCodec>,
    state: &Arc<ConnectionState>,
    router: &Arc<Router>,
    config: &ConnectionConfig,
) {
    let idle_timeout = config.idle_timeout;
    let max_frame_bytes = config.frame.max_frame_bytes;
    loop {
        let outcome = tokio::select! {
            _ = state.cancel.cancelled() => return,
            outcome = next_frame(&mut reader, idle_timeout) => outcome,
        };

        let frame = match outcome {
            ReadOutcome::Frame(frame) => frame,
            ReadOutcome::Eof => {
                debug!(conn_id = state.id, "peer closed the connection");
                return;
            }
            ReadOutcome::Idle => {
                debug!(conn_id = state.id, timeout = ?idle_timeout, "idle timeout");
                return;
            }
            ReadOutcome::Failed(e) if e.is_protocol_violation() => {
                warn!(conn_id = state.id, error = %e, "protocol violation");
                return;
            }
            ReadOutcome::Failed(e) => {
                debug!(conn_id = state.id, error = %e, "read failed");
                return;
            }
        };

        if frame.is_keepalive() {
            trace!(conn_id = state.id, req_id = frame.req_id, "keepalive");
            continue;
        }

        match frame.req_type {
            RequestType::ReqRes => {
                let state = Arc::clone(state);
                let router = Arc::clone(router);
                tokio::spawn(async move {
                    let response = router.route(&frame.body);
                    let response =
                        fit_response(state.id, frame.req_id, response, max_frame_bytes);
                    state.enqueue(Frame::request(frame.req_id, response));
                });
            }
            RequestType::SubPub => {
                debug!(
                    conn_id = state.id,
                    req_id = frame.req_id,
                    "sub_pub frame ignored"
                );
            }
        }
    }
}

/// Swap a response the frame codec would refuse for a FAIL envelope, so the
/// caller still gets exactly one answer and the connection survives.
fn fit_response(
    conn_id: u64,
    req_id: u64,
    response: Vec<u8>,
    max_frame_bytes: usize,
) -> Vec<u8> {
    if response.len() < max_frame_bytes {
        return response;
    }
    let size = response.len();
    warn!(conn_id, req_id, size, max = max_frame_bytes, "response too large");
    let fail = dispatch::fail(&format!("response too large: {size} bytes"));
    if fail.len() < max_frame_bytes {
        fail
    } else {
        FAIL_FALLBACK.to_vec()
    }
}

async fn write_loop<W>(
    mut writer: FramedWrite<W, FrameCodec>,
    mut queue: mpsc::UnboundedReceiver<Frame>,
    state: Arc<ConnectionState>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = state.cancel.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let req_id = frame.req_id;
        if let Err(e) = writer.send(frame).await {
            warn!(conn_id = state.id, req_id, error = %e, "write failed");
            state.close();
            break;
        }
        trace!(conn_id = state.id, req_id, "response written");
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use tinyrpc_codec::{unpack_reply, Reply};

    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000)
    }

    #[test]
    fn close_is_idempotent() {
        let (state, _queue) = ConnectionState::new(1, peer());
        assert!(!state.is_closed());
        state.close();
        state.close();
        assert!(state.is_closed());
        assert!(state.cancel.is_cancelled());
    }

    #[test]
    fn enqueue_after_close_is_dropped() {
        let (state, mut queue) = ConnectionState::new(2, peer());
        state.enqueue(Frame::request(1, b"first".to_vec()));
        state.close();
        state.enqueue(Frame::request(2, b"second".to_vec()));

        assert_eq!(queue.try_recv().expect("first frame queued").req_id, 1);
        assert!(queue.try_recv().is_err());
    }

    #[test]
    fn oversized_response_becomes_fail() {
        let response = fit_response(1, 9, vec![0xa0; 64], 48);
        assert!(response.len() < 48);
        let reply: Reply<String> = unpack_reply(&response).expect("reply should unpack");
        assert_eq!(reply, Reply::Fail("response too large: 64 bytes".to_string()));

        let small = vec![0x91, 0x00];
        assert_eq!(fit_response(1, 10, small.clone(), 48), small);
    }

    #[test]
    fn tiny_limit_falls_back_to_bare_fail() {
        let response = fit_response(1, 9, vec![0xa0; 64], 8);
        assert_eq!(response, FAIL_FALLBACK.to_vec());
    }

    #[tokio::test]
    async fn write_queue_keeps_each_producer_in_order() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 250;

        let (state, queue) = ConnectionState::new(3, peer());
        let (near, far) = tokio::io::duplex(1024);
        let writer = tokio::spawn(write_loop(
            FramedWrite::new(near, FrameCodec::new()),
            queue,
            Arc::clone(&state),
        ));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        let req_id = producer * 1_000 + seq;
                        state.enqueue(Frame::request(req_id, req_id.to_le_bytes().to_vec()));
                    }
                })
            })
            .collect();

        let mut reader = FramedRead::new(far, FrameCodec::new());
        let mut next_seq = vec![0u64; PRODUCERS as usize];
        for _ in 0..PRODUCERS * PER_PRODUCER {
            let frame = reader
                .next()
                .await
                .expect("frame should arrive")
                .expect("frame should decode");
            let producer = (frame.req_id / 1_000) as usize;
            assert_eq!(frame.req_id % 1_000, next_seq[producer], "producer {producer} reordered");
            assert_eq!(frame.body.as_ref(), frame.req_id.to_le_bytes());
            next_seq[producer] += 1;
        }
        assert!(next_seq.iter().all(|&n| n == PER_PRODUCER));

        for producer in producers {
            producer.join().expect("producer thread should finish");
        }
        state.close();
        writer.await.expect("writer should exit");
    }
}
