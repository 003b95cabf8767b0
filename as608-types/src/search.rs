//! Search results

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Library slot matched by Search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchMatch {
    /// Matching page id
    pub page: u16,

    /// Match score, higher is better
    pub score: u16,
}

impl SearchMatch {
    /// Parse the four result bytes of a successful Search ack
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::Parse(format!("search result needs 4 bytes, got {}", buf.len())));
        }

        Ok(Self {
            page: BigEndian::read_u16(&buf[0..2]),
            score: BigEndian::read_u16(&buf[2..4]),
        })
    }
}

impl fmt::Display for SearchMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} (score {})", self.page, self.score)
    }
}
