//! Exchange engine
//!
//! One half-duplex link, one holder at a time. [`Channel::lock`] hands out a
//! [`ChannelGuard`] that owns the transport and the stream framer for the
//! length of a whole operation, bulk transfers included, so frames of two
//! operations never interleave on the wire.
//!
//! A guard dropped mid-operation (cancelled future, early return) leaves the
//! link marked dirty; the next holder purges before its first write.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use as608_core::{Command, ConnectionState, Frame, PacketKind, StreamFramer};
use as608_transport::Transport;
use bytes::Bytes;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::config::{BusyPolicy, SensorConfig};
use crate::error::{Error, Result};
use crate::events::StatusEvent;

const READ_CHUNK: usize = 1024;

/// Transport plus everything that must stay in step with it
struct Link {
    transport: Box<dyn Transport>,
    framer: StreamFramer,
    buf: Box<[u8]>,
    dirty: bool,
}

/// The shared channel to one module
pub struct Channel {
    link: Mutex<Link>,
    state: ConnectionState,
    config: SensorConfig,
    password: AtomicU32,
    events: broadcast::Sender<StatusEvent>,
}

impl Channel {
    pub fn new(transport: Box<dyn Transport>, config: SensorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            link: Mutex::new(Link {
                transport,
                framer: StreamFramer::with_capacity(4096),
                buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
                dirty: false,
            }),
            state: ConnectionState::new(config.address),
            password: AtomicU32::new(config.password),
            config,
            events,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Password used for verification
    pub fn password(&self) -> u32 {
        self.password.load(Ordering::Acquire)
    }

    pub fn set_password(&self, password: u32) {
        self.password.store(password, Ordering::Release);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Publish a status event; nobody listening is fine
    pub fn emit(&self, event: StatusEvent) {
        trace!(%event, "Status");
        let _ = self.events.send(event);
    }

    /// Take exclusive use of the link
    ///
    /// Waits for the current holder, or fails with [`Error::Busy`] under
    /// [`BusyPolicy::Reject`]. A link left dirty by an abandoned operation
    /// is purged before the guard is returned.
    pub async fn lock(&self) -> Result<ChannelGuard<'_>> {
        let link = match self.config.busy {
            BusyPolicy::Wait => self.link.lock().await,
            BusyPolicy::Reject => self.link.try_lock().map_err(|_| Error::Busy)?,
        };

        let mut guard = ChannelGuard {
            link,
            channel: self,
        };

        if guard.link.dirty {
            if guard.link.transport.is_connected() {
                debug!("Previous operation was abandoned, purging link");
                guard.purge().await?;
            } else {
                guard.link.framer.clear();
                guard.link.dirty = false;
            }
        }

        Ok(guard)
    }

    /// Write one frame and wait for the next frame of `expected` kind
    pub async fn send_and_await(
        &self,
        frame: &Frame,
        expected: PacketKind,
        operation: Command,
        timeout: Duration,
    ) -> Result<Frame> {
        let mut guard = self.lock().await?;
        guard.mark_dirty();
        guard.send(frame).await?;
        let reply = guard.await_frame(expected, operation, timeout).await?;
        guard.mark_clean();
        Ok(reply)
    }
}

/// Exclusive access to the link for one operation
pub struct ChannelGuard<'a> {
    link: MutexGuard<'a, Link>,
    channel: &'a Channel,
}

impl<'a> ChannelGuard<'a> {
    pub fn channel(&self) -> &'a Channel {
        self.channel
    }

    pub fn state(&self) -> &'a ConnectionState {
        &self.channel.state
    }

    pub fn config(&self) -> &'a SensorConfig {
        &self.channel.config
    }

    pub fn remote_addr(&self) -> String {
        self.link.transport.remote_addr()
    }

    pub fn is_open(&self) -> bool {
        self.link.transport.is_connected()
    }

    /// Open the transport and mark the link connected
    pub async fn open(&mut self) -> Result<()> {
        self.link.transport.connect().await?;
        self.link.framer.clear();
        self.link.dirty = false;
        self.channel.state.connect()?;
        Ok(())
    }

    /// Close the transport and forget connection state
    pub async fn close(&mut self) -> Result<()> {
        let result = self.link.transport.disconnect().await;
        self.link.framer.clear();
        self.link.dirty = false;
        self.channel.state.close();
        result.map_err(Error::from)
    }

    /// An operation with wire side effects has started
    pub fn mark_dirty(&mut self) {
        self.link.dirty = true;
    }

    /// The operation reached a clean end
    pub fn mark_clean(&mut self) {
        self.link.dirty = false;
    }

    /// Write a frame, then let the module settle
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.write(frame).await?;
        sleep(self.channel.config.pacing_delay).await;
        Ok(())
    }

    /// Write a data chunk with no settling delay
    pub async fn send_chunk(&mut self, frame: &Frame) -> Result<()> {
        self.write(frame).await
    }

    async fn write(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode();
        debug!(frame = %frame, "Sending");
        trace!("TX {}", hex::encode_upper(&bytes[..bytes.len().min(48)]));

        let timeout = self.channel.config.timeouts.write;
        self.link.transport.send(&bytes, timeout).await?;
        Ok(())
    }

    /// Read whatever arrives within `timeout` into the framer
    ///
    /// Returns the number of bytes read, 0 when the link stayed silent.
    pub async fn read_some(&mut self, timeout: Duration) -> Result<usize> {
        let Link {
            transport,
            framer,
            buf,
            ..
        } = &mut *self.link;

        let n = transport.receive(buf, timeout).await?;
        if n > 0 {
            framer.push(&buf[..n]);
        }
        Ok(n)
    }

    /// Next buffered frame addressed to us
    pub fn next_frame(&mut self) -> Option<Frame> {
        while let Some(frame) = self.link.framer.next_frame() {
            if self.channel.state.accepts(frame.address) {
                return Some(frame);
            }
            warn!(
                address = format!("0x{:08X}", frame.address),
                target = format!("0x{:08X}", self.channel.state.target_address()),
                "Dropping frame from foreign address"
            );
        }
        None
    }

    /// Wait for the next frame of `expected` kind
    ///
    /// Frames of other kinds are skipped; data chunks of an abandoned
    /// transfer may still be draining.
    pub async fn await_frame(
        &mut self,
        expected: PacketKind,
        operation: Command,
        timeout: Duration,
    ) -> Result<Frame> {
        let start = Instant::now();
        let deadline = start + timeout;

        loop {
            while let Some(frame) = self.next_frame() {
                if frame.kind == expected {
                    trace!(frame = %frame, "Matched reply");
                    return Ok(frame);
                }
                debug!(frame = %frame, expected = %expected, "Skipping stale frame");
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(%operation, ?timeout, "No reply");
                return Err(Error::Timeout {
                    operation,
                    after: now - start,
                });
            }

            self.read_some(deadline - now).await?;
        }
    }

    /// Send a command and wait for its acknowledgement
    pub async fn exchange(&mut self, command: Command, args: &[u8], timeout: Duration) -> Result<Frame> {
        let frame = Frame::command(self.channel.state.target_address(), command, args)?;

        self.mark_dirty();
        self.send(&frame).await?;
        let ack = self.await_frame(PacketKind::Ack, command, timeout).await?;
        self.mark_clean();

        Ok(ack)
    }

    /// Send a command and require a success confirmation
    ///
    /// Returns the result bytes that follow the confirmation code.
    pub async fn command(&mut self, command: Command, args: &[u8], timeout: Duration) -> Result<Bytes> {
        let ack = self.exchange(command, args, timeout).await?;
        check_ack(command, &ack)?;
        Ok(ack.ack_results())
    }

    /// Flush every stale byte from the transport and the framer
    pub async fn purge(&mut self) -> Result<()> {
        self.link.transport.purge().await?;

        // Bytes already on the wire keep arriving for a moment
        let deadline = Instant::now() + self.channel.config.drain_window;
        let mut drained = 0usize;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            drained += self.read_some(deadline - now).await?;
        }

        if drained > 0 || self.link.framer.buffered() > 0 {
            debug!(drained, buffered = self.link.framer.buffered(), "Purged link");
        }

        self.link.framer.clear();
        self.link.dirty = false;
        Ok(())
    }
}

/// Turn a non-success acknowledgement into a device error
pub fn check_ack(operation: Command, ack: &Frame) -> Result<()> {
    match ack.confirmation() {
        Some(code) if code.is_success() => Ok(()),
        Some(code) => {
            debug!(%operation, %code, "Device rejected command");
            Err(Error::Device { operation, code })
        }
        None => Err(as608_core::Error::Malformed(format!("empty ack for {}", operation)).into()),
    }
}
