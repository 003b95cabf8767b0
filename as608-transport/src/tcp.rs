//! TCP transport for serial-over-TCP bridges (ser2net, ESP-Link and the like)
//!
//! The bridge forwards the UART byte stream unchanged, so the framing is the
//! same as on a local serial port.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// TCP transport
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to bridge {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Frames are small and latency-sensitive
        stream.set_nodelay(true)?;

        debug!("Connected to bridge {}", addr);

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            let _ = stream.shutdown().await;
        }

        self.socket_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8], write_timeout: Duration) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode_upper(&data[..data.len().min(32)]));

        timeout(write_timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| Error::WriteTimeout)??;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], read_timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let n = match timeout(read_timeout, stream.read(buf)).await {
            Ok(result) => result?,
            Err(_) => return Ok(0),
        };

        if n == 0 {
            warn!("Bridge closed the connection");
            return Err(Error::ConnectionClosed);
        }

        trace!("Received {} bytes: {}", n, hex::encode_upper(&buf[..n.min(32)]));

        Ok(n)
    }

    async fn purge(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut scratch = [0u8; 1024];
        let mut dropped = 0usize;

        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => dropped += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if dropped > 0 {
            debug!(dropped, "Purged pending bridge bytes");
        }

        Ok(())
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn bridge() -> (TcpTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new("127.0.0.1", port);
        let (connected, accepted) = tokio::join!(transport.connect(), listener.accept());
        connected.unwrap();

        (transport, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_tcp_transport_create() {
        let transport = TcpTransport::new("192.168.1.50", 2000);
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "192.168.1.50:2000");
    }

    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport = TcpTransport::new("invalid..address", 2000)
            .with_connect_timeout(Duration::from_millis(100));

        let result = transport.connect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let (mut transport, mut peer) = bridge().await;

        transport
            .send(&[0xEF, 0x01, 0xFF], Duration::from_secs(1))
            .await
            .unwrap();
        let mut got = [0u8; 3];
        peer.read_exact(&mut got).await.unwrap();
        assert_eq!(got, [0xEF, 0x01, 0xFF]);

        peer.write_all(&[1, 2, 3, 4]).await.unwrap();
        let mut buf = [0u8; 16];
        let n = transport.receive(&mut buf, Duration::from_secs(1)).await.unwrap();
        assert!(n > 0);
        assert_eq!(&buf[..n], &[1, 2, 3, 4][..n]);
    }

    #[tokio::test]
    async fn test_tcp_receive_timeout_is_empty() {
        let (mut transport, _peer) = bridge().await;

        let mut buf = [0u8; 16];
        let n = transport
            .receive(&mut buf, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_tcp_purge_drops_pending() {
        let (mut transport, mut peer) = bridge().await;

        peer.write_all(&[0xAA; 64]).await.unwrap();
        peer.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        transport.purge().await.unwrap();

        let mut buf = [0u8; 16];
        let n = transport
            .receive(&mut buf, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_tcp_closed_by_peer() {
        let (mut transport, peer) = bridge().await;
        drop(peer);

        let mut buf = [0u8; 16];
        let result = transport.receive(&mut buf, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
}
