//! Connection-wide state
//!
//! Tracks, for one connection to one module:
//! - Target address (changed by address recovery)
//! - Negotiated data packet size (changed by a parameter query)
//! - Library capacity (changed by a parameter query)
//! - Link state

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicUsize, Ordering};

use tracing::debug;

use crate::constants::{BROADCAST_ADDRESS, DEFAULT_LIBRARY_CAPACITY, DEFAULT_PACKET_SIZE};
use crate::error::{Error, Result};

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Transport closed
    Disconnected,

    /// Transport open, password not verified yet
    Connected,

    /// Password verified, every command accepted
    Unlocked,
}

/// Connection state shared by every operation on one module
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct ConnectionState {
    inner: Arc<StateInner>,
}

#[derive(Debug)]
struct StateInner {
    /// Address placed in outgoing frames and expected in replies
    target_address: AtomicU32,

    /// Address to fall back to on reset
    initial_address: u32,

    /// Data chunk size for bulk transfers
    packet_size: AtomicUsize,

    /// Number of library pages
    capacity: AtomicU16,

    state: parking_lot::RwLock<LinkState>,
}

impl ConnectionState {
    /// Create a disconnected state targeting `address`
    pub fn new(address: u32) -> Self {
        Self {
            inner: Arc::new(StateInner {
                target_address: AtomicU32::new(address),
                initial_address: address,
                packet_size: AtomicUsize::new(DEFAULT_PACKET_SIZE),
                capacity: AtomicU16::new(DEFAULT_LIBRARY_CAPACITY),
                state: parking_lot::RwLock::new(LinkState::Disconnected),
            }),
        }
    }

    /// Current target address
    pub fn target_address(&self) -> u32 {
        self.inner.target_address.load(Ordering::Acquire)
    }

    /// Replace the target address
    pub fn set_target_address(&self, address: u32) {
        let previous = self.inner.target_address.swap(address, Ordering::AcqRel);
        if previous != address {
            debug!(
                from = format!("0x{:08X}", previous),
                to = format!("0x{:08X}", address),
                "Target address changed"
            );
        }
    }

    /// Check if replies from any address are acceptable
    pub fn is_broadcast(&self) -> bool {
        self.target_address() == BROADCAST_ADDRESS
    }

    /// Check if a reply address is acceptable for the current target
    ///
    /// Any address is accepted while the target is broadcast, which is how
    /// address recovery learns the real one. Otherwise only the target.
    pub fn accepts(&self, address: u32) -> bool {
        let target = self.target_address();
        target == BROADCAST_ADDRESS || address == target
    }

    /// Negotiated data chunk size
    pub fn packet_size(&self) -> usize {
        self.inner.packet_size.load(Ordering::Acquire)
    }

    /// Adopt a newly negotiated chunk size
    pub fn set_packet_size(&self, size: usize) {
        self.inner.packet_size.store(size, Ordering::Release);
    }

    /// Library capacity in pages
    pub fn capacity(&self) -> u16 {
        self.inner.capacity.load(Ordering::Acquire)
    }

    /// Adopt the capacity reported by the module
    pub fn set_capacity(&self, capacity: u16) {
        self.inner.capacity.store(capacity, Ordering::Release);
    }

    /// Get current link state
    pub fn state(&self) -> LinkState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        !matches!(self.state(), LinkState::Disconnected)
    }

    /// Check if the password has been verified
    pub fn is_unlocked(&self) -> bool {
        matches!(self.state(), LinkState::Unlocked)
    }

    /// Transport opened
    pub fn connect(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != LinkState::Disconnected {
            return Err(Error::InvalidArgument(format!(
                "cannot connect from state: {:?}",
                *state
            )));
        }

        *state = LinkState::Connected;
        Ok(())
    }

    /// Password verified
    pub fn unlock(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state == LinkState::Disconnected {
            return Err(Error::InvalidArgument(
                "cannot unlock a disconnected link".into(),
            ));
        }

        *state = LinkState::Unlocked;
        Ok(())
    }

    /// Tear down: forget everything negotiated on this connection
    pub fn close(&self) {
        self.inner
            .target_address
            .store(self.inner.initial_address, Ordering::Release);
        self.inner
            .packet_size
            .store(DEFAULT_PACKET_SIZE, Ordering::Release);
        self.inner
            .capacity
            .store(DEFAULT_LIBRARY_CAPACITY, Ordering::Release);
        *self.inner.state.write() = LinkState::Disconnected;
    }

    /// Validate a page range against the library capacity
    pub fn check_pages(&self, start: u16, count: u16) -> Result<()> {
        let capacity = self.capacity();

        if count == 0 || start >= capacity || start as u32 + count as u32 > capacity as u32 {
            return Err(Error::InvalidArgument(format!(
                "pages {}..{} outside library 0..{}",
                start,
                start as u32 + count as u32,
                capacity
            )));
        }

        Ok(())
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(BROADCAST_ADDRESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_new() {
        let state = ConnectionState::default();
        assert_eq!(state.target_address(), BROADCAST_ADDRESS);
        assert_eq!(state.packet_size(), 128);
        assert_eq!(state.capacity(), 300);
        assert_eq!(state.state(), LinkState::Disconnected);
        assert!(!state.is_connected());
    }

    #[test]
    fn test_connect_unlock_close() {
        let state = ConnectionState::new(0x0000_0001);
        state.connect().unwrap();
        state.unlock().unwrap();
        assert!(state.is_unlocked());

        state.set_target_address(0x0A0B_0C0D);
        state.set_packet_size(256);
        state.close();

        assert_eq!(state.target_address(), 0x0000_0001);
        assert_eq!(state.packet_size(), 128);
        assert_eq!(state.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_invalid_state_transitions() {
        let state = ConnectionState::default();
        assert!(state.unlock().is_err());

        state.connect().unwrap();
        assert!(state.connect().is_err());
    }

    #[test]
    fn test_accepts() {
        let state = ConnectionState::new(0x0A0B_0C0D);
        assert!(state.accepts(0x0A0B_0C0D));
        assert!(!state.accepts(BROADCAST_ADDRESS));
        assert!(!state.accepts(0x0000_0001));

        state.set_target_address(BROADCAST_ADDRESS);
        assert!(state.accepts(0x0000_0001));
    }

    #[test]
    fn test_check_pages() {
        let state = ConnectionState::default();
        assert!(state.check_pages(0, 1).is_ok());
        assert!(state.check_pages(299, 1).is_ok());
        assert!(state.check_pages(0, 300).is_ok());
        assert!(state.check_pages(300, 1).is_err());
        assert!(state.check_pages(250, 51).is_err());
        assert!(state.check_pages(10, 0).is_err());
    }

    #[test]
    fn test_state_clone_shares() {
        let a = ConnectionState::default();
        let b = a.clone();

        a.set_packet_size(64);
        assert_eq!(b.packet_size(), 64);
    }
}
