//! Error types for as608-core

/// Result type alias for as608-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
///
/// None of these ever reach a caller of a device operation: the stream
/// framer recovers from them by resynchronizing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Frame does not start with the protocol magic
    #[error("Bad magic: 0x{0:04X}")]
    BadMagic(u16),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Declared length disagrees with the bytes present
    #[error("Length mismatch: header declares {declared} bytes, frame carries {actual}")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },

    /// Packet identifier byte is not one of the known kinds
    #[error("Unknown packet kind: 0x{0:02X}")]
    UnknownPacketKind(u8),

    /// Valid frame of the wrong kind
    #[error("Unexpected packet kind: expected {expected}, got {actual}")]
    UnexpectedPacketKind {
        expected: crate::packet::PacketKind,
        actual: crate::packet::PacketKind,
    },

    /// Payload does not fit the 16-bit length field
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Argument rejected before encoding
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Ack payload too short for the result it should carry
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl Error {
    /// Check if error describes a frame that must be discarded
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort { .. }
                | Self::BadMagic(_)
                | Self::ChecksumMismatch { .. }
                | Self::LengthMismatch { .. }
                | Self::UnknownPacketKind(_)
                | Self::UnexpectedPacketKind { .. }
                | Self::Malformed(_)
        )
    }
}
