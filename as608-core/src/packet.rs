//! Frame structure and encoding/decoding

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::Command,
    confirmation::ConfirmationCode,
    constants::{BROADCAST_ADDRESS, MAGIC, MAGIC_BYTES},
    error::{Error, Result},
};

/// Packet identifier byte
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Host to module command
    Command = 0x01,

    /// Data chunk, more follow
    Data = 0x02,

    /// Module to host acknowledgement
    Ack = 0x07,

    /// Last data chunk
    DataEnd = 0x08,
}

impl PacketKind {
    /// Check if this kind carries bulk payload
    pub fn is_data(self) -> bool {
        matches!(self, Self::Data | Self::DataEnd)
    }
}

impl From<PacketKind> for u8 {
    fn from(kind: PacketKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Data),
            0x07 => Ok(Self::Ack),
            0x08 => Ok(Self::DataEnd),
            _ => Err(Error::UnknownPacketKind(value)),
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Command => "COMMAND",
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::DataEnd => "DATA_END",
        };
        write!(f, "{}(0x{:02X})", name, *self as u8)
    }
}

/// Protocol frame
///
/// # Frame Structure
///
/// ```text
/// ┌─────────┬───────────┬─────────┬──────────┬───────────┬───────────┐
/// │  Magic  │  Address  │  Kind   │  Length  │  Payload  │ Checksum  │
/// │ 2 bytes │  4 bytes  │ 1 byte  │ 2 bytes  │  N bytes  │  2 bytes  │
/// │  EF 01  │  (BE u32) │         │ (BE u16) │           │ (BE u16)  │
/// └─────────┴───────────┴─────────┴──────────┴───────────┴───────────┘
/// ```
///
/// `Length` counts the payload plus the checksum, so `Length == N + 2`.
///
/// # Examples
///
/// ```
/// use as608_core::{Frame, PacketKind};
///
/// let frame = Frame::with_payload(0xFFFF_FFFF, PacketKind::Command, vec![0x01]).unwrap();
/// let encoded = frame.encode();
///
/// let decoded = Frame::decode(&encoded).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Target (host to module) or source (module to host) address
    pub address: u32,

    /// Packet identifier
    pub kind: PacketKind,

    /// Command code and arguments, data chunk, or confirmation code and results
    pub payload: Bytes,
}

impl Frame {
    /// Fixed header size: magic, address, kind, length
    pub const HEADER_SIZE: usize = 9;

    /// Trailing checksum size
    pub const CHECKSUM_SIZE: usize = 2;

    /// Smallest acknowledgement frame: header, confirmation code, checksum
    pub const MIN_ACK_SIZE: usize = Self::HEADER_SIZE + 1 + Self::CHECKSUM_SIZE;

    /// Largest payload the length field can describe
    pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - Self::CHECKSUM_SIZE;

    /// Create a frame, rejecting payloads the length field cannot describe
    pub fn with_payload(address: u32, kind: PacketKind, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();

        if payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            address,
            kind,
            payload,
        })
    }

    /// Create a command frame: code followed by arguments
    pub fn command(address: u32, command: Command, args: &[u8]) -> Result<Self> {
        let mut payload = BytesMut::with_capacity(1 + args.len());
        payload.put_u8(command.into());
        payload.put_slice(args);

        Self::with_payload(address, PacketKind::Command, payload.freeze())
    }

    /// Create a data frame; the final chunk is marked `DataEnd`
    pub fn data(address: u32, chunk: impl Into<Bytes>, is_last: bool) -> Result<Self> {
        let kind = if is_last {
            PacketKind::DataEnd
        } else {
            PacketKind::Data
        };

        Self::with_payload(address, kind, chunk)
    }

    /// Value of the length field
    pub fn length(&self) -> u16 {
        (self.payload.len() + Self::CHECKSUM_SIZE) as u16
    }

    /// Calculate checksum for this frame
    pub fn checksum(&self) -> u16 {
        checksum::calculate(self.kind.into(), self.length(), &self.payload)
    }

    /// Get total encoded size
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + Self::CHECKSUM_SIZE
    }

    /// Encode frame to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u16(MAGIC);
        buf.put_u32(self.address);
        buf.put_u8(self.kind.into());
        buf.put_u16(self.length());
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum());

        buf
    }

    /// Read the header of a buffered frame
    ///
    /// Returns the kind byte and the total frame size, or `None` when fewer
    /// than [`Frame::HEADER_SIZE`] bytes are present or the magic is wrong.
    pub fn peek_header(buf: &[u8]) -> Option<(u8, usize)> {
        if buf.len() < Self::HEADER_SIZE || buf[..2] != MAGIC_BYTES {
            return None;
        }

        let length = BigEndian::read_u16(&buf[7..9]) as usize;
        Some((buf[6], Self::HEADER_SIZE + length))
    }

    /// Decode exactly one frame from `buf`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than the smallest frame
    /// - Magic does not match
    /// - Length field disagrees with the buffer size
    /// - Packet kind is unknown
    /// - Checksum verification fails
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let min = Self::HEADER_SIZE + Self::CHECKSUM_SIZE;
        if buf.len() < min {
            return Err(Error::FrameTooShort {
                expected: min,
                actual: buf.len(),
            });
        }

        let magic = BigEndian::read_u16(&buf[0..2]);
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let address = BigEndian::read_u32(&buf[2..6]);
        let kind_raw = buf[6];
        let length = BigEndian::read_u16(&buf[7..9]);

        if (length as usize) < Self::CHECKSUM_SIZE
            || Self::HEADER_SIZE + length as usize != buf.len()
        {
            return Err(Error::LengthMismatch {
                declared: length as usize,
                actual: buf.len() - Self::HEADER_SIZE,
            });
        }

        let kind = PacketKind::try_from(kind_raw)?;

        let body_end = buf.len() - Self::CHECKSUM_SIZE;
        let payload = &buf[Self::HEADER_SIZE..body_end];
        let received = BigEndian::read_u16(&buf[body_end..]);

        if !checksum::verify(kind_raw, length, payload, received) {
            return Err(Error::ChecksumMismatch {
                expected: checksum::calculate(kind_raw, length, payload),
                received,
            });
        }

        Ok(Self {
            address,
            kind,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Command code of a command frame
    pub fn command_code(&self) -> Option<u8> {
        match self.kind {
            PacketKind::Command => self.payload.first().copied(),
            _ => None,
        }
    }

    /// Confirmation code of an acknowledgement frame
    pub fn confirmation(&self) -> Option<ConfirmationCode> {
        match self.kind {
            PacketKind::Ack => self.payload.first().map(|&b| ConfirmationCode::from(b)),
            _ => None,
        }
    }

    /// Result bytes following the confirmation code of an Ack
    pub fn ack_results(&self) -> Bytes {
        if self.kind == PacketKind::Ack && !self.payload.is_empty() {
            self.payload.slice(1..)
        } else {
            Bytes::new()
        }
    }

    /// Check if the frame comes from (or is meant for) every module
    pub fn is_broadcast(&self) -> bool {
        self.address == BROADCAST_ADDRESS
    }
}

/// Encode a command frame
///
/// `length = args.len() + 3` (code, arguments, checksum).
pub fn encode_command(address: u32, command: Command, args: &[u8]) -> Result<BytesMut> {
    Ok(Frame::command(address, command, args)?.encode())
}

/// Encode a data frame, `DataEnd` when `is_last`
pub fn encode_data(address: u32, chunk: &[u8], is_last: bool) -> Result<BytesMut> {
    Ok(Frame::data(address, Bytes::copy_from_slice(chunk), is_last)?.encode())
}

/// Decode an acknowledgement frame
///
/// Returns the confirmation code and the result bytes that follow it.
pub fn decode_ack(buf: &[u8]) -> Result<(ConfirmationCode, Bytes)> {
    if buf.len() < Frame::MIN_ACK_SIZE {
        return Err(Error::FrameTooShort {
            expected: Frame::MIN_ACK_SIZE,
            actual: buf.len(),
        });
    }

    let frame = Frame::decode(buf)?;
    if frame.kind != PacketKind::Ack {
        return Err(Error::UnexpectedPacketKind {
            expected: PacketKind::Ack,
            actual: frame.kind,
        });
    }

    let code = frame
        .confirmation()
        .ok_or_else(|| Error::Malformed("ack without confirmation code".into()))?;

    Ok((code, frame.ack_results()))
}

/// Read the address field of any frame that starts with the magic
pub fn extract_address(buf: &[u8]) -> Option<u32> {
    if buf.len() < 6 || buf[..2] != MAGIC_BYTES {
        return None;
    }

    Some(BigEndian::read_u32(&buf[2..6]))
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("address", &format!("0x{:08X}", self.address))
            .field("kind", &self.kind)
            .field("length", &self.length())
            .field("checksum", &format!("0x{:04X}", self.checksum()))
            .field("payload", &hex::encode_upper(&self.payload[..self.payload.len().min(16)]))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[{}](addr=0x{:08X}, len={})",
            self.kind,
            self.address,
            self.payload.len()
        )
    }
}
