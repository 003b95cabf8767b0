//! Sensor configuration

use std::time::Duration;

use as608_core::constants::{timeouts, BROADCAST_ADDRESS, DEFAULT_PASSWORD};

/// Per-operation time budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Cheap commands: capture, extract, merge, handshake, password
    pub command: Duration,

    /// Library commands: store, delete, empty, search, index
    pub database: Duration,

    /// ReadSysParams
    pub parameters: Duration,

    /// Overall budget for an image download
    pub image_transfer: Duration,

    /// Silence that ends an image download
    pub image_inactivity: Duration,

    /// Overall budget for a template download
    pub template_transfer: Duration,

    /// Silence that ends a template download
    pub template_inactivity: Duration,

    /// Wait for the ack following the last uploaded chunk
    pub upload_final_ack: Duration,

    /// Write timeout handed to the transport
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: timeouts::COMMAND,
            database: timeouts::DATABASE,
            parameters: timeouts::PARAMETERS,
            image_transfer: timeouts::IMAGE_TRANSFER,
            image_inactivity: timeouts::IMAGE_INACTIVITY,
            template_transfer: timeouts::TEMPLATE_TRANSFER,
            template_inactivity: timeouts::TEMPLATE_INACTIVITY,
            upload_final_ack: timeouts::UPLOAD_FINAL_ACK,
            write: Duration::from_millis(1_000),
        }
    }
}

/// What to make of a missing ack after the last uploaded chunk
///
/// Some firmware acknowledges upload completion and some stays silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SilentAckPolicy {
    /// Treat silence as success, reported as [`UploadAck::Silent`](crate::UploadAck::Silent)
    #[default]
    AcceptSilence,

    /// Treat silence as a timeout
    Reject,
}

/// What to do when the channel is held by another operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Queue behind the current holder
    #[default]
    Wait,

    /// Fail fast with [`Error::Busy`](crate::Error::Busy)
    Reject,
}

/// Sensor configuration
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Module password checked on connect
    pub password: u32,

    /// Initially assumed module address
    pub address: u32,

    pub timeouts: Timeouts,

    /// Settling time after every command write
    pub pacing_delay: Duration,

    /// Gap between uploaded data chunks
    pub chunk_delay: Duration,

    /// How long a purge keeps draining late bytes
    pub drain_window: Duration,

    /// Gap between consecutive index page reads
    pub index_page_gap: Duration,

    /// Wait after opening the transport before the first command
    pub boot_delay: Duration,

    pub silent_ack: SilentAckPolicy,

    pub busy: BusyPolicy,

    /// Buffered status events per subscriber
    pub event_capacity: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            password: DEFAULT_PASSWORD,
            address: BROADCAST_ADDRESS,
            timeouts: Timeouts::default(),
            pacing_delay: timeouts::PACING_DELAY,
            chunk_delay: timeouts::CHUNK_DELAY,
            drain_window: timeouts::DRAIN_WINDOW,
            index_page_gap: timeouts::INDEX_PAGE_GAP,
            boot_delay: timeouts::BOOT_DELAY,
            silent_ack: SilentAckPolicy::default(),
            busy: BusyPolicy::default(),
            event_capacity: 64,
        }
    }
}

impl SensorConfig {
    pub fn with_password(mut self, password: u32) -> Self {
        self.password = password;
        self
    }

    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    pub fn with_silent_ack(mut self, policy: SilentAckPolicy) -> Self {
        self.silent_ack = policy;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy = policy;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SensorConfig::default();

        assert_eq!(config.address, BROADCAST_ADDRESS);
        assert_eq!(config.password, 0);
        assert_eq!(config.silent_ack, SilentAckPolicy::AcceptSilence);
        assert_eq!(config.busy, BusyPolicy::Wait);
        assert!(config.timeouts.image_transfer > config.timeouts.command);
        assert!(config.timeouts.image_inactivity < config.timeouts.image_transfer);
    }

    #[test]
    fn test_builder() {
        let config = SensorConfig::default()
            .with_password(0x1234)
            .with_address(0x0A0B_0C0D)
            .with_busy_policy(BusyPolicy::Reject)
            .with_event_capacity(0);

        assert_eq!(config.password, 0x1234);
        assert_eq!(config.address, 0x0A0B_0C0D);
        assert_eq!(config.busy, BusyPolicy::Reject);
        assert_eq!(config.event_capacity, 1);
    }
}
