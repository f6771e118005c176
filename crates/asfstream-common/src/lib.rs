//! Asfstream-Common: shared types and utilities.
//!
//! This crate provides the pieces every other asfstream crate builds on:
//!
//! - **Error Handling**: the session error taxonomy and result alias
//! - **Input Sources**: the [`InputSource`] byte-source contract and [`FileInput`]
//! - **Text**: UTF-16LE decoding with an ASCII fallback
//! - **Core Types**: bandwidth presets and the MMS transport selector
//!
//! # Examples
//!
//! ```
//! use asfstream_common::{BandwidthPreset, FileInput, InputSource, Result};
//! use std::io::Cursor;
//!
//! fn example() -> Result<u64> {
//!     let input = FileInput::new(Cursor::new(vec![0u8; 32]))?;
//!     Ok(input.length())
//! }
//!
//! assert_eq!(example().unwrap(), 32);
//! assert_eq!(BandwidthPreset::default().bits_per_second(), 1_544_000);
//! ```

pub mod error;
pub mod input;
pub mod text;
pub mod types;

pub use error::{Error, Result};
pub use input::{FileInput, InputSource};
pub use text::Utf16Codec;
pub use types::*;
