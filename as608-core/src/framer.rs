//! Stream framer
//!
//! Turns an arbitrarily chunked byte stream into validated frames. The
//! framer owns no transport: bytes are pushed in with [`StreamFramer::push`]
//! and frames are pulled out with [`StreamFramer::next_frame`].
//!
//! Garbage is dropped one byte at a time until the magic lines up, and a
//! frame that fails validation only costs its first byte, so a corrupted
//! header that swallowed the start of the next frame cannot hide it.

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::{
    constants::{MAGIC_BYTES, MAX_DATA_CHUNK},
    packet::{Frame, PacketKind},
};

/// Largest frame the module sends: a full data chunk
pub const MAX_FRAME_SIZE: usize = Frame::HEADER_SIZE + MAX_DATA_CHUNK + Frame::CHECKSUM_SIZE;

/// Result of polling the framer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// A complete, checksum-valid frame
    Frame(Frame),

    /// More bytes are needed
    Incomplete,
}

/// Counters kept across the framer's lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FramerStats {
    /// Frames emitted
    pub frames: u64,

    /// Bytes dropped while hunting for the magic
    pub skipped_bytes: u64,

    /// Candidate frames rejected by validation
    pub rejected_frames: u64,
}

/// Incremental frame extractor
#[derive(Debug, Default)]
pub struct StreamFramer {
    buf: BytesMut,
    stats: FramerStats,
}

impl StreamFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a framer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            stats: FramerStats::default(),
        }
    }

    /// Append bytes received from the transport
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Lifetime counters
    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Drop every buffered byte
    pub fn clear(&mut self) {
        if !self.buf.is_empty() {
            trace!(bytes = self.buf.len(), "Clearing framer buffer");
        }
        self.buf.clear();
    }

    /// Extract the next complete frame, if any
    pub fn poll(&mut self) -> Poll {
        match self.next_frame() {
            Some(frame) => Poll::Frame(frame),
            None => Poll::Incomplete,
        }
    }

    /// Extract the next complete frame, or `None` if more bytes are needed
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            self.resync();

            let (kind, total) = Frame::peek_header(&self.buf)?;

            if PacketKind::try_from(kind).is_err()
                || total < Frame::HEADER_SIZE + Frame::CHECKSUM_SIZE
                || total > MAX_FRAME_SIZE
            {
                self.reject(format_args!("bad header (kind=0x{:02X}, size={})", kind, total));
                continue;
            }

            if self.buf.len() < total {
                trace!(
                    buffered = self.buf.len(),
                    needed = total,
                    "Incomplete frame"
                );
                return None;
            }

            match Frame::decode(&self.buf[..total]) {
                Ok(frame) => {
                    self.buf.advance(total);
                    self.stats.frames += 1;
                    trace!(frame = %frame, "Framed");
                    return Some(frame);
                }
                Err(e) => self.reject(format_args!("{}", e)),
            }
        }
    }

    /// Drain every complete frame currently buffered
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    fn resync(&mut self) {
        let mut skipped = 0usize;

        while !self.buf.is_empty() {
            if self.buf.len() >= 2 {
                if self.buf[..2] == MAGIC_BYTES {
                    break;
                }
            } else if self.buf[0] == MAGIC_BYTES[0] {
                // Lone first magic byte, wait for the next one
                break;
            }

            self.buf.advance(1);
            skipped += 1;
        }

        if skipped > 0 {
            self.stats.skipped_bytes += skipped as u64;
            trace!(skipped, "Resynchronized to frame header");
        }
    }

    fn reject(&mut self, reason: std::fmt::Arguments<'_>) {
        warn!(%reason, "Discarding corrupt frame candidate");
        self.buf.advance(1);
        self.stats.rejected_frames += 1;
    }
}
