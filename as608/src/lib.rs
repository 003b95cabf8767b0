//! # as608
//!
//! Host-side driver for AS608-family optical fingerprint sensors
//! (AS608, R307, R503, ZFM-20 and compatibles).
//!
//! ## Features
//!
//! - Bit-exact frame codec with stream resynchronization
//! - Single-flight exchange engine over a half-duplex serial link
//! - Image and template transfer in both directions
//! - Address and password recovery
//! - Async/await API using Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use as608::Sensor;
//!
//! #[tokio::main]
//! async fn main() -> as608::Result<()> {
//!     let sensor = Sensor::new("/dev/ttyUSB0");
//!     sensor.connect().await?;
//!
//!     let params = sensor.read_parameters().await?;
//!     println!("{}", params);
//!
//!     let count = sensor.template_count().await?;
//!     println!("{} templates stored", count);
//!
//!     sensor.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
pub mod outcome;
pub mod sensor;

// Re-exports
pub use bulk::UploadAck;
pub use config::{BusyPolicy, SensorConfig, SilentAckPolicy, Timeouts};
pub use error::{EnrollStep, Error, Result};
pub use events::StatusEvent;
pub use outcome::Outcome;
pub use sensor::Sensor;

// Re-export types
pub use as608_core::{Command, ConfirmationCode, ConnectionState, Frame, PacketKind};
pub use as608_transport::{SerialTransport, TcpTransport, Transport};
pub use as608_types::{
    FingerprintImage, PacketSize, SearchMatch, SecurityLevel, SystemParameters, Template, TemplateIndex,
};
pub use tokio_util::sync::CancellationToken;
