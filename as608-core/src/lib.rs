//! # as608-core
//!
//! Core protocol implementation for AS608-family fingerprint modules.
//!
//! This crate provides the I/O-free protocol primitives:
//! - Frame structure and encoding/decoding
//! - Checksum calculation
//! - Command and confirmation codes
//! - Stream framing with resynchronization
//! - Bulk transfer reassembly and chunking
//! - Connection-wide state

pub mod checksum;
pub mod command;
pub mod confirmation;
pub mod constants;
pub mod error;
pub mod framer;
pub mod packet;
pub mod session;
pub mod transfer;

pub use command::Command;
pub use confirmation::ConfirmationCode;
pub use error::{Error, Result};
pub use framer::StreamFramer;
pub use packet::{decode_ack, encode_command, encode_data, extract_address, Frame, PacketKind};
pub use session::{ConnectionState, LinkState};
pub use transfer::{Direction, ExpectedSize, Reassembly, TransferState};
