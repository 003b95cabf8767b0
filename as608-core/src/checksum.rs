//! Frame checksum
//!
//! The checksum is the plain 16-bit sum of every byte from the packet
//! identifier up to the end of the payload:
//!
//! ```text
//! sum(kind, len_hi, len_lo, payload...) mod 65536
//! ```
//!
//! The magic and the address are not covered.

use tracing::trace;

/// Calculate the checksum of a frame
///
/// `length` is the value of the length field, i.e. `payload.len() + 2`.
///
/// # Examples
///
/// ```
/// use as608_core::checksum;
///
/// // GenImg: kind 0x01, length 3, code 0x01
/// assert_eq!(checksum::calculate(0x01, 3, &[0x01]), 0x0005);
/// ```
pub fn calculate(kind: u8, length: u16, payload: &[u8]) -> u16 {
    let [len_hi, len_lo] = length.to_be_bytes();

    let sum = payload
        .iter()
        .fold(kind as u16 + len_hi as u16 + len_lo as u16, |acc, &b| {
            acc.wrapping_add(b as u16)
        });

    trace!(
        kind = kind,
        length = length,
        payload_len = payload.len(),
        checksum = format!("0x{:04X}", sum),
        "Calculated checksum"
    );

    sum
}

/// Verify checksum
pub fn verify(kind: u8, length: u16, payload: &[u8], expected: u16) -> bool {
    calculate(kind, length, payload) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_gen_img() {
        // EF01 FFFFFFFF 01 0003 01 0005
        assert_eq!(calculate(0x01, 3, &[0x01]), 0x0005);
    }

    #[test]
    fn test_checksum_read_sys_params() {
        // EF01 FFFFFFFF 01 0003 0F 0013
        assert_eq!(calculate(0x01, 3, &[0x0F]), 0x0013);
    }

    #[test]
    fn test_checksum_verify() {
        let payload = [0x13, 0x00, 0x00, 0x00, 0x00];
        let checksum = calculate(0x01, 7, &payload);

        assert!(verify(0x01, 7, &payload, checksum));
        assert!(!verify(0x01, 7, &payload, checksum.wrapping_add(1)));
    }

    #[test]
    fn test_checksum_wraps() {
        let payload = vec![0xFF; 300];
        let expected = (0x02u32 + 0x01 + 0x2E + 300 * 0xFF) % 65536;

        assert_eq!(calculate(0x02, 302, &payload) as u32, expected);
    }

    #[test]
    fn test_checksum_length_bytes_counted() {
        assert_ne!(calculate(0x02, 4, &[1, 2]), calculate(0x02, 5, &[1, 2]));
    }
}
