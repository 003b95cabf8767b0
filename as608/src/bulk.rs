//! Bulk transfer manager
//!
//! Multi-frame transfers run entirely under one [`ChannelGuard`]. Downloads
//! end on a `DataEnd` frame, on reaching the known size, or after a period
//! of silence; uploads are chunked at the negotiated packet size and sent
//! back to back.

use std::time::Duration;

use as608_core::command::args;
use as608_core::transfer::chunk_frames;
use as608_core::{Command, Direction, ExpectedSize, PacketKind, Reassembly, TransferState};
use bytes::Bytes;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::SilentAckPolicy;
use crate::error::{Error, Result};
use crate::events::StatusEvent;
use crate::exchange::{check_ack, ChannelGuard};

/// Emit a progress event at most this often, in bytes
const PROGRESS_STEP: usize = 4096;

/// How an upload was confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAck {
    /// The module acknowledged the last chunk with success
    Confirmed,

    /// The module stayed silent and silence was accepted
    Silent,
}

/// A download request
#[derive(Debug, Clone)]
pub struct Download {
    /// Command that makes the module start sending
    pub trigger: Command,
    pub args: Bytes,
    pub expected: ExpectedSize,

    /// Overall budget
    pub overall: Duration,

    /// Silence that ends the transfer
    pub inactivity: Duration,
}

/// State of one in-flight transfer
#[derive(Debug)]
pub struct TransferSession {
    pub direction: Direction,
    pub chunk_size: usize,
    started: Instant,
    deadline: Instant,
}

impl TransferSession {
    pub fn new(direction: Direction, chunk_size: usize, budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            direction,
            chunk_size,
            started,
            deadline: started + budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Run a download to completion
///
/// An empty result is a timeout. An image that arrives short is padded by
/// [`Reassembly::finish`]; a template is returned as received.
pub async fn download(guard: &mut ChannelGuard<'_>, request: &Download, cancel: &CancellationToken) -> Result<Bytes> {
    let state = guard.state();
    let channel = guard.channel();
    let session = TransferSession::new(Direction::Download, state.packet_size(), request.overall);
    let mut reassembly = Reassembly::new(request.expected);
    let expected_len = match request.expected {
        ExpectedSize::Exact(size) => Some(size),
        ExpectedSize::Open => None,
    };

    if !request.trigger.starts_download() {
        return Err(Error::InvalidArgument(format!(
            "{} does not start a download",
            request.trigger
        )));
    }

    debug!(trigger = %request.trigger, expected = ?request.expected, "Starting download");

    let trigger = as608_core::Frame::command(state.target_address(), request.trigger, &request.args)?;
    guard.mark_dirty();
    guard.send(&trigger).await?;
    reassembly.triggered();

    let mut last_activity = Instant::now();
    let mut next_progress = PROGRESS_STEP;

    'transfer: loop {
        while let Some(frame) = guard.next_frame() {
            if frame.kind == PacketKind::Ack {
                if let Some(code) = frame.confirmation().filter(|c| !c.is_success()) {
                    reassembly.failed();
                    guard.mark_clean();
                    return Err(Error::Device {
                        operation: request.trigger,
                        code,
                    });
                }
            }

            if reassembly.on_frame(&frame) {
                break 'transfer;
            }

            if reassembly.received() >= next_progress {
                next_progress = reassembly.received() + PROGRESS_STEP;
                channel.emit(StatusEvent::TransferProgress {
                    received: reassembly.received(),
                    expected: expected_len,
                });
            }
        }

        let idle = last_activity.elapsed();
        if session.expired() || idle >= request.inactivity {
            debug!(
                received = reassembly.received(),
                elapsed = ?session.elapsed(),
                idle = ?idle,
                "Download stopped"
            );
            reassembly.timed_out();
            break;
        }

        let wait = session.remaining().min(request.inactivity - idle);
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            n = guard.read_some(wait) => Some(n?),
        };

        match read {
            None => {
                info!(received = reassembly.received(), "Download cancelled");
                reassembly.failed();
                guard.purge().await?;
                return Err(Error::Cancelled);
            }
            Some(0) => {}
            Some(n) => {
                trace!(n, total = reassembly.received(), "Download bytes");
                last_activity = Instant::now();
            }
        }
    }

    let received = reassembly.received();
    if received == 0 {
        return Err(Error::Timeout {
            operation: request.trigger,
            after: session.elapsed(),
        });
    }

    if reassembly.state() == TransferState::Complete {
        guard.mark_clean();
    }

    let data = reassembly.finish();
    debug!(received, returned = data.len(), elapsed = ?session.elapsed(), "Download finished");
    channel.emit(StatusEvent::TransferFinished { bytes: data.len() });

    Ok(data)
}

/// Upload `payload` into a character buffer
pub async fn upload(
    guard: &mut ChannelGuard<'_>,
    buffer: u8,
    payload: &Bytes,
    cancel: &CancellationToken,
) -> Result<UploadAck> {
    let state = guard.state();
    let config = guard.config();
    let session = TransferSession::new(Direction::Upload, state.packet_size(), config.timeouts.template_transfer);

    // Validate everything before the module is told to expect data
    let frames = chunk_frames(state.target_address(), payload, session.chunk_size)?;

    debug!(
        bytes = payload.len(),
        chunk_size = session.chunk_size,
        frames = frames.len(),
        "Starting upload"
    );

    guard
        .command(Command::DownChar, &args::buffer(buffer)?, config.timeouts.command)
        .await?;
    guard.mark_dirty();

    let last = frames.len() - 1;
    for (i, frame) in frames.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(sent = i, total = frames.len(), "Upload cancelled");
            guard.purge().await?;
            return Err(Error::Cancelled);
        }
        if session.expired() {
            return Err(Error::Timeout {
                operation: Command::DownChar,
                after: session.elapsed(),
            });
        }

        guard.send_chunk(frame).await?;
        if i < last {
            sleep(config.chunk_delay).await;
        }
    }

    let ack = match guard
        .await_frame(PacketKind::Ack, Command::DownChar, config.timeouts.upload_final_ack)
        .await
    {
        Ok(frame) => frame,
        Err(Error::Timeout { after, .. }) => {
            return match config.silent_ack {
                SilentAckPolicy::AcceptSilence => {
                    warn!(?after, "No acknowledgement after last chunk, assuming success");
                    guard.mark_clean();
                    guard.channel().emit(StatusEvent::UploadSilentAck);
                    Ok(UploadAck::Silent)
                }
                SilentAckPolicy::Reject => Err(Error::Timeout {
                    operation: Command::DownChar,
                    after,
                }),
            };
        }
        Err(e) => return Err(e),
    };

    guard.mark_clean();
    check_ack(Command::DownChar, &ack)?;

    debug!(elapsed = ?session.elapsed(), "Upload confirmed");
    guard.channel().emit(StatusEvent::TransferFinished { bytes: payload.len() });
    Ok(UploadAck::Confirmed)
}
