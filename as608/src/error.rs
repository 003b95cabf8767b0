//! High-level error types

use std::time::Duration;

use as608_core::{Command, ConfirmationCode};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[source] as608_core::Error),

    #[error("{operation} failed: {code}")]
    Device {
        operation: Command,
        code: ConfirmationCode,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] as608_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] as608_types::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Command, after: Duration },

    #[error("Channel busy with another operation")]
    Busy,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Implausible template size: {size} bytes")]
    ImplausibleTemplate { size: usize },

    #[error("Enrollment failed at {step}: {source}")]
    Enroll {
        step: EnrollStep,
        #[source]
        source: Box<Error>,
    },

    #[error("Address recovery failed: {0}")]
    Recovery(String),

    #[error("Sensor not connected")]
    NotConnected,
}

/// Steps of the enrollment sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollStep {
    FirstCapture,
    FirstExtract,
    SecondCapture,
    SecondExtract,
    Merge,
}

impl std::fmt::Display for EnrollStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FirstCapture => "first capture",
            Self::FirstExtract => "first feature extraction",
            Self::SecondCapture => "second capture",
            Self::SecondExtract => "second feature extraction",
            Self::Merge => "merge",
        };
        f.write_str(name)
    }
}

impl From<as608_core::Error> for Error {
    fn from(e: as608_core::Error) -> Self {
        match e {
            // Rejected on the host before anything was sent
            as608_core::Error::InvalidArgument(msg) => Self::InvalidArgument(msg),
            other => Self::Protocol(other),
        }
    }
}

impl Error {
    /// Confirmation code reported by the module, if this failure carries one
    pub fn device_code(&self) -> Option<ConfirmationCode> {
        match self {
            Self::Device { code, .. } => Some(*code),
            Self::Enroll { source, .. } => source.device_code(),
            _ => None,
        }
    }

    /// The module said nothing within the budget
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Enroll { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Re-issuing the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Device { code, .. } => matches!(
                code,
                ConfirmationCode::NoFinger
                    | ConfirmationCode::ImageFailed
                    | ConfirmationCode::ImageDisordered
                    | ConfirmationCode::ImageTooSmall
                    | ConfirmationCode::MergeFailed
                    | ConfirmationCode::PacketError
            ),
            Self::Timeout { .. } | Self::Busy | Self::Cancelled | Self::ImplausibleTemplate { .. } => true,
            Self::Enroll { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// The link is gone and must be reopened
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_fatal(),
            Self::NotConnected => true,
            Self::Enroll { source, .. } => source.requires_reconnect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let err = Error::Device {
            operation: Command::GenImg,
            code: ConfirmationCode::NoFinger,
        };
        assert_eq!(err.device_code(), Some(ConfirmationCode::NoFinger));
        assert!(err.is_recoverable());
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("GenImg"));
    }

    #[test]
    fn test_enroll_error_delegates() {
        let err = Error::Enroll {
            step: EnrollStep::SecondExtract,
            source: Box::new(Error::Timeout {
                operation: Command::Img2Tz,
                after: Duration::from_secs(3),
            }),
        };
        assert!(err.is_timeout());
        assert_eq!(err.device_code(), None);
        assert!(err.to_string().starts_with("Enrollment failed at second feature extraction"));
    }

    #[test]
    fn test_transport_errors_require_reconnect() {
        let err = Error::from(as608_transport::Error::ConnectionClosed);
        assert!(err.requires_reconnect());
        assert!(!Error::Busy.requires_reconnect());
    }

    #[test]
    fn test_host_validation_is_invalid_argument() {
        let err: Error = as608_core::Error::InvalidArgument("page 300 out of range".into()).into();
        assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains("300")));

        let err: Error = as608_core::Error::BadMagic(0x1234).into();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
