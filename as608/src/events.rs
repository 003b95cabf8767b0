//! Human-readable progress events
//!
//! Every [`Sensor`](crate::Sensor) clone shares one broadcast channel.
//! Subscribers that fall behind lose the oldest events, never block the
//! sensor.

use std::fmt;

use as608_core::{Command, ConfirmationCode};

/// Progress notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Connecting { remote: String },
    Connected { address: u32 },
    Disconnected,
    AddressRecovered { address: u32 },
    PlaceFinger,
    RemoveFinger,
    ImageCaptured,
    FeaturesExtracted { buffer: u8 },
    ModelReady,
    TemplateStored { page: u16 },
    TemplatesDeleted { page: u16, count: u16 },
    LibraryEmptied,
    Matched { page: u16, score: u16 },
    TransferProgress { received: usize, expected: Option<usize> },
    TransferFinished { bytes: usize },
    UploadSilentAck,
    DeviceRejected { operation: Command, code: ConfirmationCode },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting { remote } => write!(f, "Connecting to {}", remote),
            Self::Connected { address } => write!(f, "Connected to sensor 0x{:08X}", address),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::AddressRecovered { address } => {
                write!(f, "Sensor answers at address 0x{:08X}", address)
            }
            Self::PlaceFinger => f.write_str("Place finger on the sensor"),
            Self::RemoveFinger => f.write_str("Remove finger"),
            Self::ImageCaptured => f.write_str("Image captured"),
            Self::FeaturesExtracted { buffer } => write!(f, "Features extracted to buffer {}", buffer),
            Self::ModelReady => f.write_str("Model ready"),
            Self::TemplateStored { page } => write!(f, "Template stored at page {}", page),
            Self::TemplatesDeleted { page, count } => {
                write!(f, "Deleted {} template(s) from page {}", count, page)
            }
            Self::LibraryEmptied => f.write_str("Template library emptied"),
            Self::Matched { page, score } => write!(f, "Matched page {} (score {})", page, score),
            Self::TransferProgress { received, expected: Some(total) } => {
                write!(f, "Received {}/{} bytes", received, total)
            }
            Self::TransferProgress { received, expected: None } => {
                write!(f, "Received {} bytes", received)
            }
            Self::TransferFinished { bytes } => write!(f, "Transfer finished ({} bytes)", bytes),
            Self::UploadSilentAck => f.write_str("Upload finished without a final acknowledgement"),
            Self::DeviceRejected { operation, code } => {
                write!(f, "{} rejected: {}", operation.name(), code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            StatusEvent::Connected { address: 0xFFFF_FFFF }.to_string(),
            "Connected to sensor 0xFFFFFFFF"
        );
        assert_eq!(
            StatusEvent::TransferProgress { received: 128, expected: Some(36_864) }.to_string(),
            "Received 128/36864 bytes"
        );
        assert!(StatusEvent::DeviceRejected {
            operation: Command::GenImg,
            code: ConfirmationCode::NoFinger,
        }
        .to_string()
        .starts_with("GenImg rejected"));
    }
}
