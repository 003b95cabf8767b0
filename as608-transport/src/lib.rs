//! Transport layer for the AS608 protocol
//!
//! Provides the half-duplex byte link to a module: a USB-serial adapter,
//! or a serial-over-TCP bridge.

pub mod error;
pub mod serial;
pub mod tcp;

pub use error::{Error, Result};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;

/// Byte link to a module
///
/// The protocol layer only ever writes whole frames, reads whatever bytes
/// are available, and purges stale input. It never depends on how the link
/// was found or opened.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link
    async fn connect(&mut self) -> Result<()>;

    /// Close the link
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Write all of `data` within `timeout`
    async fn send(&mut self, data: &[u8], timeout: Duration) -> Result<()>;

    /// Read available bytes into `buf`, waiting at most `timeout`
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discard everything sitting in the receive (and transmit) buffers
    async fn purge(&mut self) -> Result<()>;

    /// Human-readable endpoint, for logs
    fn remote_addr(&self) -> String;
}
