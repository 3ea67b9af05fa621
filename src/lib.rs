//! Vodforge - HLS transcoding and delivery service
//!
//! This library crate exposes the core functionality for integration testing.

pub mod catalog;
pub mod config;
pub mod delivery;
pub mod server;
pub mod transcode;
