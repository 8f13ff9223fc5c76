use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// A bound, not yet registered TCP listener.
///
/// Binding happens on the caller's thread so bind errors surface before any
/// worker starts. The listener is handed to a runtime later with
/// [`TcpAcceptor::listen`], which must run inside that runtime.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Bind and listen on `addr` (e.g. `"0.0.0.0:9000"`, `"127.0.0.1:0"`).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = std::net::TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::Bind {
                addr: addr.to_string(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register the listener with the current tokio runtime.
    pub fn listen(self) -> Result<TcpListener> {
        TcpListener::from_std(self.listener).map_err(TransportError::Io)
    }
}

/// Resolve a `host:port` string to the first socket address it names.
pub fn resolve(addr: &str) -> Result<SocketAddr> {
    let mut addrs = addr.to_socket_addrs().map_err(|e| TransportError::Resolve {
        addr: addr.to_string(),
        source: e,
    })?;
    addrs.next().ok_or_else(|| TransportError::Resolve {
        addr: addr.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
    })
}

/// Connect to `addr`, giving up after `timeout`. Never retries.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(TransportError::Connect { addr, source }),
        Err(_) => return Err(TransportError::ConnectTimeout { addr, timeout }),
    };
    configure_stream(&stream)?;
    debug!(%addr, "connected to tcp endpoint");
    Ok(stream)
}

/// Apply the socket options every tinyrpc stream uses.
///
/// Frames are small and latency bound, so Nagle is disabled.
pub fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true).map_err(TransportError::Io)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_bind_accept_connect() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr();
        assert_ne!(addr.port(), 0);
        let listener = acceptor.listen().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = connect(addr, Duration::from_secs(1)).await.unwrap();
            stream.write_all(b"hello").await.unwrap();
        });

        let (mut server, _peer) = listener.accept().await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr();
        drop(acceptor);

        let result = connect(addr, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_bind_rejects_address_in_use() {
        let first = TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let addr = first.local_addr().to_string();

        let result = TcpAcceptor::bind(&addr);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn test_resolve_localhost() {
        let addr = resolve("127.0.0.1:9000").unwrap();
        assert_eq!(addr.port(), 9000);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        let result = resolve("not an address");
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }
}
