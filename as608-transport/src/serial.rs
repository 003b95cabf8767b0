//! Serial transport for USB-serial adapters
//!
//! The module speaks 8N1 UART, 57600 baud out of the box. `serialport` is
//! blocking, so every port access runs on tokio's blocking pool.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Serial transport
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    port: Option<SharedPort>,
    open_timeout: Duration,
    pulse_lines: bool,
}

impl SerialTransport {
    /// Default UART speed
    pub const DEFAULT_BAUD_RATE: u32 = 57_600;

    /// Create new serial transport
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
            open_timeout: Duration::from_millis(1_000),
            pulse_lines: true,
        }
    }

    /// Set the I/O timeout used while opening the port
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Toggle DTR/RTS after opening, which resets some adapter boards
    pub fn with_line_pulse(mut self, pulse: bool) -> Self {
        self.pulse_lines = pulse;
        self
    }

    /// Run `f` against the open port on the blocking pool
    async fn blocking<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn SerialPort) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let port = self.port.clone().ok_or(Error::NotConnected)?;

        tokio::task::spawn_blocking(move || {
            let mut guard = port.lock();
            f(&mut **guard)
        })
        .await
        .map_err(|e| Error::Worker(e.to_string()))?
    }
}

fn pulse_control_lines(port: &mut dyn SerialPort) -> serialport::Result<()> {
    port.write_data_terminal_ready(true)?;
    port.write_request_to_send(true)?;
    port.write_data_terminal_ready(false)?;
    thread::sleep(Duration::from_millis(10));
    port.write_data_terminal_ready(true)?;
    thread::sleep(Duration::from_millis(10));
    port.write_request_to_send(false)?;
    thread::sleep(Duration::from_millis(10));
    port.write_request_to_send(true)?;
    Ok(())
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        debug!("Opening {} at {} baud...", self.path, self.baud_rate);

        let builder = serialport::new(self.path.clone(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.open_timeout);
        let pulse = self.pulse_lines;

        let port = tokio::task::spawn_blocking(move || -> Result<Box<dyn SerialPort>> {
            let mut port = builder.open()?;
            if pulse {
                if let Err(e) = pulse_control_lines(port.as_mut()) {
                    warn!("Control line pulse failed: {}", e);
                }
            }
            Ok(port)
        })
        .await
        .map_err(|e| Error::Worker(e.to_string()))??;

        debug!("Opened {}", self.path);

        self.port = Some(Arc::new(Mutex::new(port)));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closing {}...", self.path);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn send(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        trace!("Sending {} bytes: {}", data.len(), hex::encode_upper(&data[..data.len().min(32)]));

        let data = data.to_vec();
        self.blocking(move |port| {
            port.set_timeout(timeout)?;
            port.write_all(&data).map_err(|e| match e.kind() {
                io::ErrorKind::TimedOut => Error::WriteTimeout,
                _ => Error::Io(e),
            })?;
            port.flush()?;
            Ok(())
        })
        .await
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let capacity = buf.len();

        let data = self
            .blocking(move |port| {
                port.set_timeout(timeout)?;
                let mut tmp = vec![0u8; capacity];
                match port.read(&mut tmp) {
                    Ok(n) => {
                        tmp.truncate(n);
                        Ok(tmp)
                    }
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
                    Err(e) => Err(Error::Io(e)),
                }
            })
            .await?;

        let n = data.len();
        buf[..n].copy_from_slice(&data);

        if n > 0 {
            trace!("Received {} bytes: {}", n, hex::encode_upper(&buf[..n.min(32)]));
        }

        Ok(n)
    }

    async fn purge(&mut self) -> Result<()> {
        self.blocking(|port| {
            let pending = port.bytes_to_read().unwrap_or(0);
            port.clear(ClearBuffer::All)?;
            if pending > 0 {
                debug!(pending, "Purged serial buffers");
            }
            Ok(())
        })
        .await
    }

    fn remote_addr(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("Serial transport dropped while still open");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serial_transport_create() {
        let transport = SerialTransport::new("/dev/ttyUSB0", SerialTransport::DEFAULT_BAUD_RATE);
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "/dev/ttyUSB0@57600");
    }

    #[tokio::test]
    async fn test_serial_transport_not_connected() {
        let mut transport = SerialTransport::new("/dev/ttyUSB0", 57_600);
        let mut buf = [0u8; 16];

        assert!(matches!(
            transport.send(&[0xEF, 0x01], Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            transport.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(transport.purge().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_serial_transport_missing_device() {
        let mut transport = SerialTransport::new("/dev/as608-does-not-exist", 57_600)
            .with_line_pulse(false);

        let result = transport.connect().await;
        assert!(result.is_err());
        assert!(!transport.is_connected());
    }
}
