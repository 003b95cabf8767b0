//! Type definitions for as608

pub mod error;
pub mod image;
pub mod index;
pub mod params;
pub mod search;
pub mod template;

pub use error::{Error, Result};
pub use image::FingerprintImage;
pub use index::TemplateIndex;
pub use params::{BaudRate, PacketSize, SecurityLevel, StatusRegister, SystemParameters};
pub use search::SearchMatch;
pub use template::Template;
