//! Bulk transfer bookkeeping
//!
//! The I/O-free half of a multi-frame transfer: reassembling downloaded
//! chunks, deciding when a download is complete, normalizing the result,
//! and splitting an upload into data frames. Timing and the channel live
//! with the caller.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::{
    constants::MAX_DATA_CHUNK,
    error::{Error, Result},
    packet::{Frame, PacketKind},
};

/// Direction of a bulk transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to module
    Upload,

    /// Module to host
    Download,
}

/// Transfer lifecycle
///
/// ```text
/// Idle -> AwaitingTriggerAck -> Transferring -> Complete | TimedOut | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    AwaitingTriggerAck,
    Transferring,
    Complete,
    TimedOut,
    Failed,
}

impl TransferState {
    /// Check if no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::TimedOut | Self::Failed)
    }
}

/// What a download is expected to deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedSize {
    /// Exact size known in advance (raster image)
    Exact(usize),

    /// Size only known after the module stops sending (template)
    Open,
}

/// Reassembly state for one download
#[derive(Debug)]
pub struct Reassembly {
    state: TransferState,
    expected: ExpectedSize,
    accumulated: BytesMut,
    last_chunk_seen: bool,
    acks_seen: usize,
    data_frames: usize,
}

impl Reassembly {
    /// Create an idle reassembly
    pub fn new(expected: ExpectedSize) -> Self {
        let capacity = match expected {
            ExpectedSize::Exact(size) => size,
            ExpectedSize::Open => 1024,
        };

        Self {
            state: TransferState::Idle,
            expected,
            accumulated: BytesMut::with_capacity(capacity),
            last_chunk_seen: false,
            acks_seen: 0,
            data_frames: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Expected size of the finished payload
    pub fn expected(&self) -> ExpectedSize {
        self.expected
    }

    /// Bytes accumulated so far
    pub fn received(&self) -> usize {
        self.accumulated.len()
    }

    /// Check if a DataEnd frame arrived
    pub fn last_chunk_seen(&self) -> bool {
        self.last_chunk_seen
    }

    /// Number of Ack frames seen during the transfer
    pub fn acks_seen(&self) -> usize {
        self.acks_seen
    }

    /// Number of data frames accumulated
    pub fn data_frames(&self) -> usize {
        self.data_frames
    }

    /// The trigger command has been written
    pub fn triggered(&mut self) {
        if self.state == TransferState::Idle {
            self.state = TransferState::AwaitingTriggerAck;
        }
    }

    /// Feed one frame; returns `true` once the download is complete
    pub fn on_frame(&mut self, frame: &Frame) -> bool {
        if self.state.is_terminal() {
            return true;
        }

        match frame.kind {
            PacketKind::Ack => {
                // Handshake only; some operations never send one
                self.acks_seen += 1;
                trace!(code = ?frame.confirmation(), "Transfer handshake ack");
                if self.state == TransferState::AwaitingTriggerAck {
                    self.state = TransferState::Transferring;
                }
            }
            PacketKind::Data | PacketKind::DataEnd => {
                self.state = TransferState::Transferring;
                self.accumulated.extend_from_slice(&frame.payload);
                self.data_frames += 1;
                if frame.kind == PacketKind::DataEnd {
                    self.last_chunk_seen = true;
                }
            }
            PacketKind::Command => {
                debug!(frame = %frame, "Ignoring command frame during download");
            }
        }

        if self.is_satisfied() {
            self.state = TransferState::Complete;
        }

        self.state == TransferState::Complete
    }

    /// Check the termination conditions that do not depend on time
    pub fn is_satisfied(&self) -> bool {
        if self.last_chunk_seen {
            return true;
        }

        match self.expected {
            ExpectedSize::Exact(size) => self.accumulated.len() >= size,
            ExpectedSize::Open => false,
        }
    }

    /// The inactivity window or overall deadline expired
    pub fn timed_out(&mut self) {
        if !self.state.is_terminal() {
            self.state = TransferState::TimedOut;
        }
    }

    /// The transfer was abandoned
    pub fn failed(&mut self) {
        if !self.state.is_terminal() {
            self.state = TransferState::Failed;
        }
    }

    /// Take the reassembled payload, normalized to the expected size
    pub fn finish(self) -> Bytes {
        match self.expected {
            ExpectedSize::Exact(size) => normalize(self.accumulated, size),
            ExpectedSize::Open => self.accumulated.freeze(),
        }
    }
}

/// Force `data` to exactly `expected` bytes
///
/// Extra bytes are truncated. Missing bytes are filled by repeating the last
/// received byte: the module sometimes under-delivers a few bytes at the end
/// of an image, and a repeated edge value avoids a visible seam.
pub fn normalize(mut data: BytesMut, expected: usize) -> Bytes {
    let received = data.len();

    if received > expected {
        debug!(received, expected, "Truncating oversized transfer");
        data.truncate(expected);
    } else if received < expected {
        let pad = data.last().copied().unwrap_or(0);
        warn!(
            received,
            expected,
            pad = format!("0x{:02X}", pad),
            "Padding short transfer"
        );
        data.resize(expected, pad);
    }

    data.freeze()
}

/// Split an upload payload into data frames
///
/// Every frame carries `chunk_size` bytes except possibly the last, which is
/// marked `DataEnd`.
pub fn chunk_frames(address: u32, payload: &Bytes, chunk_size: usize) -> Result<Vec<Frame>> {
    if chunk_size == 0 || chunk_size > MAX_DATA_CHUNK {
        return Err(Error::InvalidArgument(format!(
            "chunk size must be 1..={}, got {}",
            MAX_DATA_CHUNK, chunk_size
        )));
    }

    if payload.is_empty() {
        return Err(Error::InvalidArgument("empty upload payload".into()));
    }

    let count = payload.len().div_ceil(chunk_size);

    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = (start + chunk_size).min(payload.len());
            Frame::data(address, payload.slice(start..end), i + 1 == count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BROADCAST_ADDRESS, IMAGE_SIZE};
    use crate::framer::StreamFramer;
    use crate::packet::encode_data;
    use pretty_assertions::assert_eq;

    fn image_bytes() -> Vec<u8> {
        (0..IMAGE_SIZE).map(|i| (i % 251) as u8).collect()
    }

    fn data_stream(payload: &[u8], chunk: usize) -> Vec<u8> {
        let chunks: Vec<_> = payload.chunks(chunk).collect();
        let mut stream = Vec::new();
        for (i, c) in chunks.iter().enumerate() {
            stream.extend_from_slice(&encode_data(BROADCAST_ADDRESS, c, i + 1 == chunks.len()).unwrap());
        }
        stream
    }

    fn feed(stream: &[u8], split: usize, reassembly: &mut Reassembly) {
        let mut framer = StreamFramer::new();
        for piece in stream.chunks(split) {
            framer.push(piece);
            while let Some(frame) = framer.next_frame() {
                reassembly.on_frame(&frame);
            }
        }
    }

    #[test]
    fn test_image_reassembly_across_splits() {
        let image = image_bytes();
        let stream = data_stream(&image, 128);

        for split in [1usize, 7, 4096] {
            let mut reassembly = Reassembly::new(ExpectedSize::Exact(IMAGE_SIZE));
            reassembly.triggered();
            feed(&stream, split, &mut reassembly);

            assert_eq!(reassembly.state(), TransferState::Complete);
            assert_eq!(reassembly.data_frames(), 288);
            assert_eq!(reassembly.finish().as_ref(), image.as_slice());
        }
    }

    #[test]
    fn test_short_image_padded_with_last_byte() {
        let image = image_bytes();
        let short = &image[..IMAGE_SIZE - 4];

        let mut framer = StreamFramer::new();
        let mut reassembly = Reassembly::new(ExpectedSize::Exact(IMAGE_SIZE));
        for chunk in short.chunks(128) {
            framer.push(&encode_data(BROADCAST_ADDRESS, chunk, false).unwrap());
        }
        while let Some(frame) = framer.next_frame() {
            reassembly.on_frame(&frame);
        }

        assert_eq!(reassembly.state(), TransferState::Transferring);
        reassembly.timed_out();
        assert_eq!(reassembly.state(), TransferState::TimedOut);

        let out = reassembly.finish();
        assert_eq!(out.len(), IMAGE_SIZE);
        assert_eq!(&out[..IMAGE_SIZE - 4], short);
        assert!(out[IMAGE_SIZE - 4..].iter().all(|&b| b == image[IMAGE_SIZE - 5]));
    }

    #[test]
    fn test_oversized_image_truncated() {
        let mut data = BytesMut::from(&image_bytes()[..]);
        data.extend_from_slice(&[0xAA; 10]);

        let out = normalize(data, IMAGE_SIZE);
        assert_eq!(out.as_ref(), image_bytes().as_slice());
    }

    #[test]
    fn test_template_completes_on_data_end() {
        let template = vec![0x5A; 770];
        let stream = data_stream(&template, 128);

        let mut reassembly = Reassembly::new(ExpectedSize::Open);
        reassembly.triggered();
        feed(&stream, 33, &mut reassembly);

        assert!(reassembly.last_chunk_seen());
        assert_eq!(reassembly.finish().len(), 770);
    }

    #[test]
    fn test_template_without_data_end_stays_open() {
        let mut reassembly = Reassembly::new(ExpectedSize::Open);
        let frame = Frame::data(1, vec![1u8; 128], false).unwrap();

        for _ in 0..10 {
            assert!(!reassembly.on_frame(&frame));
        }
        assert_eq!(reassembly.received(), 1280);
    }

    #[test]
    fn test_ack_is_handshake_only() {
        let mut reassembly = Reassembly::new(ExpectedSize::Open);
        reassembly.triggered();
        assert_eq!(reassembly.state(), TransferState::AwaitingTriggerAck);

        let ack = Frame::with_payload(1, PacketKind::Ack, vec![0x00]).unwrap();
        reassembly.on_frame(&ack);

        assert_eq!(reassembly.acks_seen(), 1);
        assert_eq!(reassembly.received(), 0);
        assert_eq!(reassembly.state(), TransferState::Transferring);
    }

    #[test]
    fn test_upload_chunking() {
        let template = Bytes::from(vec![0x11u8; 770]);
        let frames = chunk_frames(BROADCAST_ADDRESS, &template, 128).unwrap();

        assert_eq!(frames.len(), 7);
        assert!(frames[..6].iter().all(|f| f.payload.len() == 128 && f.kind == PacketKind::Data));
        assert_eq!(frames[6].payload.len(), 2);
        assert_eq!(frames[6].kind, PacketKind::DataEnd);
    }

    #[test]
    fn test_upload_exact_multiple() {
        let payload = Bytes::from(vec![0u8; 256]);
        let frames = chunk_frames(BROADCAST_ADDRESS, &payload, 64).unwrap();

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3].kind, PacketKind::DataEnd);
        assert_eq!(frames[3].payload.len(), 64);
    }

    #[test]
    fn test_upload_invalid_chunk_size() {
        let payload = Bytes::from(vec![0u8; 10]);
        assert!(chunk_frames(BROADCAST_ADDRESS, &payload, 0).is_err());
        assert!(chunk_frames(BROADCAST_ADDRESS, &payload, 512).is_err());
        assert!(chunk_frames(BROADCAST_ADDRESS, &Bytes::new(), 128).is_err());
    }

    #[test]
    fn test_terminal_states_stick() {
        let mut reassembly = Reassembly::new(ExpectedSize::Open);
        reassembly.failed();
        reassembly.timed_out();

        assert_eq!(reassembly.state(), TransferState::Failed);
    }
}
