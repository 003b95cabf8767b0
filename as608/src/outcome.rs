//! Result envelope for callers outside Rust's type system
//!
//! UI, persistence and sync layers want a flat record rather than a
//! `Result`; [`Outcome`] is that record.

use as608_core::ConfirmationCode;

use crate::error::Result;

/// Flattened operation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub success: bool,
    pub data: Option<T>,
    pub device_code: Option<u8>,
    pub message: String,
}

impl<T> Outcome<T> {
    /// Successful outcome with a payload
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            device_code: Some(ConfirmationCode::Success.code()),
            message: message.into(),
        }
    }

    /// Map the payload, keeping the status
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            success: self.success,
            data: self.data.map(f),
            device_code: self.device_code,
            message: self.message,
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data, ConfirmationCode::Success.message()),
            Err(e) => Self {
                success: false,
                data: None,
                device_code: e.device_code().map(ConfirmationCode::code),
                message: e.to_string(),
            },
        }
    }
}
