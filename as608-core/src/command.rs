//! Command codes and argument layouts

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Instruction codes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    // Image and features
    GenImg = 0x01,
    Img2Tz = 0x02,
    Search = 0x04,
    RegModel = 0x05,

    // Library
    Store = 0x06,
    LoadChar = 0x07,
    DeleteChar = 0x0C,
    Empty = 0x0D,
    TemplateCount = 0x1D,
    ReadIndexTable = 0x1F,

    // Bulk transfer
    UpChar = 0x08,
    DownChar = 0x09,
    UpImage = 0x0A,

    // System
    SetSysParam = 0x0E,
    ReadSysParams = 0x0F,
    SetPassword = 0x12,
    VerifyPassword = 0x13,
    Handshake = 0x17,
    Cancel = 0x30,
}

impl Command {
    /// Every known instruction
    pub const ALL: [Command; 19] = [
        Self::GenImg,
        Self::Img2Tz,
        Self::Search,
        Self::RegModel,
        Self::Store,
        Self::LoadChar,
        Self::DeleteChar,
        Self::Empty,
        Self::TemplateCount,
        Self::ReadIndexTable,
        Self::UpChar,
        Self::DownChar,
        Self::UpImage,
        Self::SetSysParam,
        Self::ReadSysParams,
        Self::SetPassword,
        Self::VerifyPassword,
        Self::Handshake,
        Self::Cancel,
    ];

    /// Check if the module answers with data frames after the Ack
    pub fn starts_download(self) -> bool {
        matches!(self, Self::UpChar | Self::UpImage)
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::GenImg => "GenImg",
            Self::Img2Tz => "Img2Tz",
            Self::Search => "Search",
            Self::RegModel => "RegModel",
            Self::Store => "Store",
            Self::LoadChar => "LoadChar",
            Self::DeleteChar => "DeleteChar",
            Self::Empty => "Empty",
            Self::TemplateCount => "TemplateCount",
            Self::ReadIndexTable => "ReadIndexTable",
            Self::UpChar => "UpChar",
            Self::DownChar => "DownChar",
            Self::UpImage => "UpImage",
            Self::SetSysParam => "SetSysParam",
            Self::ReadSysParams => "ReadSysParams",
            Self::SetPassword => "SetPassword",
            Self::VerifyPassword => "VerifyPassword",
            Self::Handshake => "Handshake",
            Self::Cancel => "Cancel",
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| *cmd as u8 == value)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown command code 0x{:02X}", value)))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Argument encoders; every multi-byte field is big-endian
pub mod args {
    use super::*;

    /// Feature buffer number, 1 or 2
    pub fn buffer(buffer: u8) -> Result<Bytes> {
        check_buffer(buffer)?;
        Ok(Bytes::copy_from_slice(&[buffer]))
    }

    /// Buffer and library page (Store, LoadChar)
    pub fn buffer_page(buffer: u8, page: u16) -> Result<Bytes> {
        check_buffer(buffer)?;

        let mut buf = BytesMut::with_capacity(3);
        buf.put_u8(buffer);
        buf.put_u16(page);
        Ok(buf.freeze())
    }

    /// Buffer, first page and page count (Search)
    pub fn search(buffer: u8, start: u16, count: u16) -> Result<Bytes> {
        check_buffer(buffer)?;

        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(buffer);
        buf.put_u16(start);
        buf.put_u16(count);
        Ok(buf.freeze())
    }

    /// First page and count (DeleteChar)
    pub fn delete(page: u16, count: u16) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u16(page);
        buf.put_u16(count);
        buf.freeze()
    }

    /// Module password (VerifyPassword, SetPassword)
    pub fn password(password: u32) -> Bytes {
        Bytes::copy_from_slice(&password.to_be_bytes())
    }

    /// Parameter number and value (SetSysParam)
    pub fn sys_param(param: u8, value: u8) -> Bytes {
        Bytes::copy_from_slice(&[param, value])
    }

    /// Index-table page (ReadIndexTable)
    pub fn index_page(page: u8) -> Bytes {
        Bytes::copy_from_slice(&[page])
    }

    fn check_buffer(buffer: u8) -> Result<()> {
        if !(1..=2).contains(&buffer) {
            return Err(Error::InvalidArgument(format!(
                "feature buffer must be 1 or 2, got {}",
                buffer
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_conversion() {
        assert_eq!(u8::from(Command::GenImg), 0x01);
        assert_eq!(Command::try_from(0x1F).unwrap(), Command::ReadIndexTable);
    }

    #[test]
    fn test_unknown_command() {
        assert!(Command::try_from(0x99).is_err());
    }

    #[test]
    fn test_all_codes_distinct() {
        for (i, a) in Command::ALL.iter().enumerate() {
            for b in &Command::ALL[i + 1..] {
                assert_ne!(*a as u8, *b as u8);
            }
        }
    }

    #[test]
    fn test_transfer_direction() {
        assert!(Command::UpImage.starts_download());
        assert!(Command::UpChar.starts_download());
        assert!(!Command::DownChar.starts_download());
        assert!(!Command::Store.starts_download());
    }

    #[test]
    fn test_search_args() {
        let encoded = args::search(1, 0, 300).unwrap();
        assert_eq!(encoded.as_ref(), &[0x01, 0x00, 0x00, 0x01, 0x2C]);
    }

    #[test]
    fn test_buffer_page_args() {
        let encoded = args::buffer_page(2, 0x0102).unwrap();
        assert_eq!(encoded.as_ref(), &[0x02, 0x01, 0x02]);
    }

    #[test]
    fn test_invalid_buffer() {
        assert!(args::buffer(0).is_err());
        assert!(args::buffer(3).is_err());
    }

    #[test]
    fn test_password_args() {
        assert_eq!(args::password(0x1234_0000).as_ref(), &[0x12, 0x34, 0x00, 0x00]);
    }
}
