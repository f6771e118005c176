//! MMS over HTTP.

pub mod chunk;
mod client;
pub mod request;

pub use client::MmshClient;
