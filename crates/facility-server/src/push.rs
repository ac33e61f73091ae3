//! TCP transport for monitor pushes.
//!
//! Each subscriber endpoint gets one connection, opened on the first push and
//! reused afterwards. Frames are reply datagrams written back to back; the
//! header's `payload_len` delimits them. Delivery is fire-and-forget: a
//! failed connect or write is logged and the connection dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Lazily connected push channels keyed by subscriber endpoint.
#[derive(Debug)]
pub struct PushTransport {
    timeout: Duration,
    connections: HashMap<SocketAddr, TcpStream>,
}

impl PushTransport {
    /// Creates a transport whose connects and writes are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            connections: HashMap::new(),
        }
    }

    /// Writes one frame to `endpoint`. Returns true if it was written.
    pub async fn push(&mut self, endpoint: SocketAddr, frame: &[u8]) -> bool {
        if !self.connections.contains_key(&endpoint) {
            match timeout(self.timeout, TcpStream::connect(endpoint)).await {
                Ok(Ok(stream)) => {
                    debug!(%endpoint, "Opened push connection");
                    self.connections.insert(endpoint, stream);
                }
                Ok(Err(e)) => {
                    warn!(%endpoint, error = %e, "Failed to connect to monitor");
                    return false;
                }
                Err(_) => {
                    warn!(%endpoint, "Timed out connecting to monitor");
                    return false;
                }
            }
        }

        let Some(stream) = self.connections.get_mut(&endpoint) else {
            return false;
        };
        match timeout(self.timeout, stream.write_all(frame)).await {
            Ok(Ok(())) => {
                debug!(%endpoint, len = frame.len(), "Pushed availability");
                true
            }
            Ok(Err(e)) => {
                warn!(%endpoint, error = %e, "Failed to push to monitor");
                self.connections.remove(&endpoint);
                false
            }
            Err(_) => {
                warn!(%endpoint, "Timed out pushing to monitor");
                self.connections.remove(&endpoint);
                false
            }
        }
    }

    /// Closes the connection to `endpoint`, if one is open.
    pub fn close(&mut self, endpoint: SocketAddr) {
        if self.connections.remove(&endpoint).is_some() {
            debug!(%endpoint, "Closed push connection");
        }
    }

    /// Returns true if a connection to `endpoint` is open.
    pub fn is_connected(&self, endpoint: SocketAddr) -> bool {
        self.connections.contains_key(&endpoint)
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connections are open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reuses_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();

        let reader = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut transport = PushTransport::new(Duration::from_secs(2));
        assert!(transport.push(endpoint, b"abc").await);
        assert!(transport.push(endpoint, b"def").await);
        assert_eq!(transport.len(), 1);

        assert_eq!(&reader.await.unwrap(), b"abcdef");

        transport.close(endpoint);
        assert!(!transport.is_connected(endpoint));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_not_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        drop(listener);

        let mut transport = PushTransport::new(Duration::from_millis(500));
        assert!(!transport.push(endpoint, b"frame").await);
        assert!(transport.is_empty());
    }
}
