//! Template library index

use std::collections::BTreeSet;
use std::fmt;

use as608_core::constants::{INDEX_BITMAP_SIZE, INDEX_PAGE_SLOTS};

use crate::error::{Error, Result};

/// Occupied library slots, assembled from ReadIndexTable pages
///
/// Each page is a 32-byte bitmap covering 256 slots. Bit `b` of byte `i`
/// on page `p` is slot `p * 256 + i * 8 + b`, least significant bit first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateIndex {
    /// Occupied slot ids
    pub occupied: BTreeSet<u16>,

    /// Pages that could not be read
    pub failed_pages: Vec<u8>,
}

impl TemplateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one page bitmap into slot ids
    pub fn decode_page(page: u8, bitmap: &[u8]) -> Result<BTreeSet<u16>> {
        if bitmap.len() < INDEX_BITMAP_SIZE {
            return Err(Error::Parse(format!(
                "index page needs {} bytes, got {}",
                INDEX_BITMAP_SIZE,
                bitmap.len()
            )));
        }

        let base = page as u16 * INDEX_PAGE_SLOTS;
        let slots = bitmap[..INDEX_BITMAP_SIZE]
            .iter()
            .enumerate()
            .flat_map(|(i, &byte)| {
                (0..8u16)
                    .filter(move |bit| (byte >> bit) & 1 == 1)
                    .map(move |bit| base + i as u16 * 8 + bit)
            })
            .collect();

        Ok(slots)
    }

    /// Merge a decoded page
    pub fn add_page(&mut self, page: u8, bitmap: &[u8]) -> Result<()> {
        let slots = Self::decode_page(page, bitmap)?;
        self.occupied.extend(slots);
        Ok(())
    }

    /// Record a page that failed to read
    pub fn mark_failed(&mut self, page: u8) {
        self.failed_pages.push(page);
    }

    /// Every requested page was read
    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }

    pub fn contains(&self, slot: u16) -> bool {
        self.occupied.contains(&slot)
    }

    pub fn len(&self) -> usize {
        self.occupied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }

    /// Lowest slot below `capacity` not in use
    pub fn first_free(&self, capacity: u16) -> Option<u16> {
        (0..capacity).find(|slot| !self.occupied.contains(slot))
    }
}

impl fmt::Display for TemplateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} templates", self.occupied.len())?;
        if !self.failed_pages.is_empty() {
            write!(f, " (unreadable pages: {:?})", self.failed_pages)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_bit_order() {
        let mut bitmap = [0u8; 32];
        bitmap[0] = 0b0000_0101;
        bitmap[1] = 0b1000_0000;
        bitmap[31] = 0b1000_0000;

        let slots: Vec<_> = TemplateIndex::decode_page(0, &bitmap).unwrap().into_iter().collect();
        assert_eq!(slots, vec![0, 2, 15, 255]);
    }

    #[test]
    fn test_decode_second_page() {
        let mut bitmap = [0u8; 32];
        bitmap[0] = 0x01;
        bitmap[5] = 0x10;

        let slots: Vec<_> = TemplateIndex::decode_page(1, &bitmap).unwrap().into_iter().collect();
        assert_eq!(slots, vec![256, 256 + 40 + 4]);
    }

    #[test]
    fn test_partial_index() {
        let mut index = TemplateIndex::new();
        let mut bitmap = [0u8; 32];
        bitmap[0] = 0x03;

        index.add_page(0, &bitmap).unwrap();
        index.mark_failed(1);

        assert_eq!(index.len(), 2);
        assert!(!index.is_complete());
        assert_eq!(index.first_free(300), Some(2));
        assert_eq!(index.to_string(), "2 templates (unreadable pages: [1])");
    }

    #[test]
    fn test_short_bitmap() {
        assert!(TemplateIndex::decode_page(0, &[0u8; 8]).is_err());
    }
}
