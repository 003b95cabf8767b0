//! System parameter structures

use std::fmt;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

bitflags! {
    /// Module status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusRegister: u16 {
        /// Module is executing a command
        const BUSY = 1 << 0;
        /// Last comparison found a match
        const PASSED = 1 << 1;
        /// Handshake password verified
        const PASSWORD_VERIFIED = 1 << 2;
        /// Image buffer holds a valid image
        const IMAGE_BUFFER_VALID = 1 << 3;
    }
}

/// Data packet size negotiated with the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketSize {
    Bytes32 = 0,
    Bytes64 = 1,
    Bytes128 = 2,
    Bytes256 = 3,
}

impl PacketSize {
    /// Decode the size code reported by the module
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            0 => Ok(Self::Bytes32),
            1 => Ok(Self::Bytes64),
            2 => Ok(Self::Bytes128),
            3 => Ok(Self::Bytes256),
            _ => Err(Error::Parse(format!("packet size code {} out of range 0..=3", code))),
        }
    }

    /// Size code used on the wire
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Chunk size in bytes
    pub fn bytes(self) -> usize {
        32 << (self as usize)
    }
}

impl Default for PacketSize {
    fn default() -> Self {
        Self::Bytes128
    }
}

impl fmt::Display for PacketSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.bytes())
    }
}

/// Matching threshold, 1 (lenient) to 5 (strict)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecurityLevel(u8);

impl SecurityLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Validated constructor
    pub fn new(level: u8) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&level) {
            return Err(Error::Validation(format!(
                "security level must be {}..={}, got {}",
                Self::MIN,
                Self::MAX,
                level
            )));
        }
        Ok(Self(level))
    }

    /// Raw level
    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<u16> for SecurityLevel {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        let level = u8::try_from(value)
            .map_err(|_| Error::Validation(format!("security level {} out of range", value)))?;
        Self::new(level)
    }
}

/// UART speed as a multiple of 9600 baud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaudRate(u16);

impl BaudRate {
    /// Wrap the multiplier the module reports
    pub fn from_multiplier(multiplier: u16) -> Self {
        Self(multiplier)
    }

    /// Multiplier N
    pub fn multiplier(self) -> u16 {
        self.0
    }

    /// Speed in baud
    pub fn baud(self) -> u32 {
        self.0 as u32 * 9_600
    }
}

/// Parameters returned by ReadSysParams
///
/// # Layout
///
/// ```text
/// offset  size  field
/// 0       2     status register
/// 2       2     system identifier
/// 4       2     library capacity
/// 6       2     security level
/// 8       4     device address
/// 12      2     packet size code
/// 14      2     baud multiplier
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemParameters {
    pub status: StatusRegister,
    pub system_id: u16,
    pub capacity: u16,
    pub security_level: SecurityLevel,
    pub address: u32,
    pub packet_size: PacketSize,
    pub baud_rate: BaudRate,
}

impl SystemParameters {
    /// Encoded size
    pub const SIZE: usize = 16;

    /// Parse the result bytes following the confirmation code
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::Parse(format!(
                "system parameters need {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }

        Ok(Self {
            status: StatusRegister::from_bits_retain(BigEndian::read_u16(&buf[0..2])),
            system_id: BigEndian::read_u16(&buf[2..4]),
            capacity: BigEndian::read_u16(&buf[4..6]),
            security_level: SecurityLevel::try_from(BigEndian::read_u16(&buf[6..8]))?,
            address: BigEndian::read_u32(&buf[8..12]),
            packet_size: PacketSize::from_code(BigEndian::read_u16(&buf[12..14]))?,
            baud_rate: BaudRate::from_multiplier(BigEndian::read_u16(&buf[14..16])),
        })
    }

    /// Encode in the wire layout
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        BigEndian::write_u16(&mut buf[0..2], self.status.bits());
        BigEndian::write_u16(&mut buf[2..4], self.system_id);
        BigEndian::write_u16(&mut buf[4..6], self.capacity);
        BigEndian::write_u16(&mut buf[6..8], self.security_level.level() as u16);
        BigEndian::write_u32(&mut buf[8..12], self.address);
        BigEndian::write_u16(&mut buf[12..14], self.packet_size.code() as u16);
        BigEndian::write_u16(&mut buf[14..16], self.baud_rate.multiplier());
        buf
    }
}

impl fmt::Display for SystemParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sensor[addr: 0x{:08X}, capacity: {}, security: {}, packet: {}, baud: {}]",
            self.address,
            self.capacity,
            self.security_level.level(),
            self.packet_size,
            self.baud_rate.baud()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RAW: [u8; 16] = [
        0x00, 0x04, // status: password verified
        0x00, 0x00, // system id
        0x01, 0x2C, // capacity 300
        0x00, 0x03, // security 3
        0xFF, 0xFF, 0xFF, 0xFF, // address
        0x00, 0x02, // 128 bytes
        0x00, 0x06, // 57600 baud
    ];

    #[test]
    fn test_parse() {
        let params = SystemParameters::parse(&RAW).unwrap();

        assert!(params.status.contains(StatusRegister::PASSWORD_VERIFIED));
        assert_eq!(params.capacity, 300);
        assert_eq!(params.security_level.level(), 3);
        assert_eq!(params.address, 0xFFFF_FFFF);
        assert_eq!(params.packet_size, PacketSize::Bytes128);
        assert_eq!(params.baud_rate.baud(), 57_600);
        assert_eq!(params.to_bytes(), RAW);
    }

    #[test]
    fn test_parse_short() {
        assert!(SystemParameters::parse(&RAW[..15]).is_err());
    }

    #[test]
    fn test_parse_bad_packet_code() {
        let mut raw = RAW;
        raw[13] = 7;
        assert!(SystemParameters::parse(&raw).is_err());
    }

    #[test]
    fn test_packet_sizes() {
        assert_eq!(PacketSize::from_code(0).unwrap().bytes(), 32);
        assert_eq!(PacketSize::from_code(1).unwrap().bytes(), 64);
        assert_eq!(PacketSize::from_code(2).unwrap().bytes(), 128);
        assert_eq!(PacketSize::from_code(3).unwrap().bytes(), 256);
    }

    #[test]
    fn test_security_level_bounds() {
        assert!(SecurityLevel::new(0).is_err());
        assert!(SecurityLevel::new(6).is_err());
        assert_eq!(SecurityLevel::new(5).unwrap().level(), 5);
    }
}
