//! Template structures

use std::fmt;

use as608_core::constants::MIN_PLAUSIBLE_TEMPLATE_SIZE;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;

use crate::error::{Error, Result};

/// Feature template as moved between a character buffer and the host
#[derive(Clone, PartialEq, Eq)]
pub struct Template {
    data: Bytes,
}

impl Template {
    /// Wrap raw template bytes
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(Error::Validation("template is empty".into()));
        }
        Ok(Self { data })
    }

    /// Decode from base64
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::new(STANDARD.decode(encoded.trim())?)
    }

    /// Encode as base64 for storage outside the module
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Large enough to be a real template rather than a cut-off transfer
    pub fn is_plausible(&self) -> bool {
        self.data.len() >= MIN_PLAUSIBLE_TEMPLATE_SIZE
    }
}

impl From<Template> for Bytes {
    fn from(template: Template) -> Self {
        template.data
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("len", &self.data.len())
            .finish()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template[{} bytes]", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base64() {
        let template = Template::new(vec![0x03, 0x01, 0x5A, 0xFF]).unwrap();
        let encoded = template.to_base64();

        assert_eq!(encoded, "AwFa/w==");
        assert_eq!(Template::from_base64(&encoded).unwrap(), template);
    }

    #[test]
    fn test_bad_base64() {
        assert!(matches!(Template::from_base64("not base64!"), Err(Error::Base64(_))));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(Template::new(Vec::new()).is_err());
    }

    #[test]
    fn test_plausibility() {
        assert!(!Template::new(vec![1u8; 100]).unwrap().is_plausible());
        assert!(Template::new(vec![1u8; 768]).unwrap().is_plausible());
    }
}
