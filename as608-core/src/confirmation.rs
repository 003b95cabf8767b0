//! Confirmation codes carried in the first payload byte of an Ack

use std::fmt;

/// Module-side outcome of a command
///
/// Codes outside the known set are preserved in [`ConfirmationCode::Unknown`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConfirmationCode {
    Success,
    PacketError,
    NoFinger,
    ImageFailed,
    ImageDisordered,
    ImageTooSmall,
    NoMatch,
    NotFound,
    MergeFailed,
    OutOfRange,
    TemplateReadError,
    UploadFailed,
    ReceiveFailed,
    ImageUploadFailed,
    DeleteFailed,
    ClearFailed,
    WrongPassword,
    RamEmpty,
    FlashWriteError,
    InvalidRegister,
    Unknown(u8),
}

impl ConfirmationCode {
    /// Check if this is a success response
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Raw code byte
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::PacketError => 0x01,
            Self::NoFinger => 0x02,
            Self::ImageFailed => 0x03,
            Self::ImageDisordered => 0x06,
            Self::ImageTooSmall => 0x07,
            Self::NoMatch => 0x08,
            Self::NotFound => 0x09,
            Self::MergeFailed => 0x0A,
            Self::OutOfRange => 0x0B,
            Self::TemplateReadError => 0x0C,
            Self::UploadFailed => 0x0D,
            Self::ReceiveFailed => 0x0E,
            Self::ImageUploadFailed => 0x0F,
            Self::DeleteFailed => 0x10,
            Self::ClearFailed => 0x11,
            Self::WrongPassword => 0x13,
            Self::RamEmpty => 0x15,
            Self::FlashWriteError => 0x18,
            Self::InvalidRegister => 0x1A,
            Self::Unknown(code) => code,
        }
    }

    /// Human-readable description
    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "command executed",
            Self::PacketError => "error receiving packet",
            Self::NoFinger => "no finger on the sensor",
            Self::ImageFailed => "failed to capture image",
            Self::ImageDisordered => "image too disordered",
            Self::ImageTooSmall => "image too small, not enough feature points",
            Self::NoMatch => "fingers do not match",
            Self::NotFound => "no matching template found",
            Self::MergeFailed => "failed to merge feature buffers",
            Self::OutOfRange => "page address out of range",
            Self::TemplateReadError => "error reading template from library",
            Self::UploadFailed => "error uploading feature file",
            Self::ReceiveFailed => "module cannot receive data packets",
            Self::ImageUploadFailed => "error uploading image",
            Self::DeleteFailed => "failed to delete template",
            Self::ClearFailed => "failed to clear library",
            Self::WrongPassword => "wrong password",
            Self::RamEmpty => "no valid image in buffer",
            Self::FlashWriteError => "error writing flash",
            Self::InvalidRegister => "invalid register number",
            Self::Unknown(_) => "unknown device code",
        }
    }
}

impl From<u8> for ConfirmationCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::PacketError,
            0x02 => Self::NoFinger,
            0x03 => Self::ImageFailed,
            0x06 => Self::ImageDisordered,
            0x07 => Self::ImageTooSmall,
            0x08 => Self::NoMatch,
            0x09 => Self::NotFound,
            0x0A => Self::MergeFailed,
            0x0B => Self::OutOfRange,
            0x0C => Self::TemplateReadError,
            0x0D => Self::UploadFailed,
            0x0E => Self::ReceiveFailed,
            0x0F => Self::ImageUploadFailed,
            0x10 => Self::DeleteFailed,
            0x11 => Self::ClearFailed,
            0x13 => Self::WrongPassword,
            0x15 => Self::RamEmpty,
            0x18 => Self::FlashWriteError,
            0x1A => Self::InvalidRegister,
            other => Self::Unknown(other),
        }
    }
}

impl From<ConfirmationCode> for u8 {
    fn from(code: ConfirmationCode) -> u8 {
        code.code()
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.message(), self.code())
    }
}
