//! Asfstream - ASF/WMV streaming toolkit
//!
//! This library crate exposes the pieces behind the `asfstream` binary for
//! integration testing.

pub mod config;
pub mod probe;
pub mod source;
pub mod stats;
