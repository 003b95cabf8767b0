//! Protocol constants

/// Start-of-frame marker, transmitted big-endian as `EF 01`
pub const MAGIC: u16 = 0xEF01;

/// Magic as it appears on the wire
pub const MAGIC_BYTES: [u8; 2] = MAGIC.to_be_bytes();

/// Broadcast address; every module answers frames sent to it
pub const BROADCAST_ADDRESS: u32 = 0xFFFF_FFFF;

/// Factory default module password
pub const DEFAULT_PASSWORD: u32 = 0x0000_0000;

/// Factory default UART speed
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Default data packet size in bytes (packet-size code 2)
pub const DEFAULT_PACKET_SIZE: usize = 128;

/// Template library capacity observed on stock modules (pages 0..=299)
pub const DEFAULT_LIBRARY_CAPACITY: u16 = 300;

/// Slots covered by one index-table page (32 bytes x 8 bits)
pub const INDEX_PAGE_SLOTS: u16 = 256;

/// Size of the occupancy bitmap returned by ReadIndexTable
pub const INDEX_BITMAP_SIZE: usize = 32;

/// Raster width of the sensor image
pub const IMAGE_WIDTH: usize = 128;

/// Raster height of the sensor image
pub const IMAGE_HEIGHT: usize = 288;

/// Size of a full raster image (one byte per pixel)
pub const IMAGE_SIZE: usize = IMAGE_WIDTH * IMAGE_HEIGHT;

/// Lower bound of the typical character-file size
pub const TYPICAL_TEMPLATE_MIN: usize = 768;

/// Upper bound of the typical character-file size
pub const TYPICAL_TEMPLATE_MAX: usize = 800;

/// Smallest template the host accepts as a complete download
pub const MIN_PLAUSIBLE_TEMPLATE_SIZE: usize = 512;

/// Largest payload a single data frame may carry
pub const MAX_DATA_CHUNK: usize = 256;

/// Feature buffers available on the module
pub mod buffers {
    /// CharBuffer 1
    pub const CHAR_BUFFER_1: u8 = 1;

    /// CharBuffer 2
    pub const CHAR_BUFFER_2: u8 = 2;
}

/// Parameter numbers accepted by SetSysParam
pub mod sys_params {
    /// Baud multiplier (N x 9600)
    pub const BAUD_RATE: u8 = 4;

    /// Security level 1..=5
    pub const SECURITY_LEVEL: u8 = 5;

    /// Data packet size code 0..=3
    pub const PACKET_SIZE: u8 = 6;
}

/// Default time budgets, one per operation class
pub mod timeouts {
    use std::time::Duration;

    /// Settling time the module needs after every write
    pub const PACING_DELAY: Duration = Duration::from_millis(10);

    /// Delay between back-to-back data frames of an upload
    pub const CHUNK_DELAY: Duration = Duration::from_millis(1);

    /// How long a purge keeps draining late bytes
    pub const DRAIN_WINDOW: Duration = Duration::from_millis(60);

    /// Cheap commands: capture, extract, merge, password
    pub const COMMAND: Duration = Duration::from_millis(3_000);

    /// Commands that touch the flash library: store, delete, empty, search
    pub const DATABASE: Duration = Duration::from_millis(4_000);

    /// System parameter query
    pub const PARAMETERS: Duration = Duration::from_millis(2_500);

    /// Whole image download
    pub const IMAGE_TRANSFER: Duration = Duration::from_millis(12_000);

    /// Silence that ends an image download
    pub const IMAGE_INACTIVITY: Duration = Duration::from_millis(1_800);

    /// Whole template download
    pub const TEMPLATE_TRANSFER: Duration = Duration::from_millis(8_000);

    /// Silence that ends a template download
    pub const TEMPLATE_INACTIVITY: Duration = Duration::from_millis(2_500);

    /// Trailing acknowledgement after an upload
    pub const UPLOAD_FINAL_ACK: Duration = Duration::from_millis(1_500);

    /// Pause between index-table pages
    pub const INDEX_PAGE_GAP: Duration = Duration::from_millis(100);

    /// Boot time after opening the port before the first password check
    pub const BOOT_DELAY: Duration = Duration::from_millis(800);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_size() {
        assert_eq!(IMAGE_SIZE, 36_864);
    }

    #[test]
    fn test_magic_bytes() {
        assert_eq!(MAGIC_BYTES, [0xEF, 0x01]);
    }
}
