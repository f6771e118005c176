//! MMS over TCP.

pub mod command;
mod client;

pub use client::MmsClient;
