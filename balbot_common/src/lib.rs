//! balbot Common Library
//!
//! Shared building blocks for the balbot proxy and its monitoring clients:
//!
//! - [`consts`] - axis count, device state constants, protocol defaults
//! - [`records`] - the fixed-size telemetry and control records exchanged
//!   between proxy and client and mirrored to the device
//! - [`trigger`] - edge-triggered one-shot counters
//! - [`half`] - IEEE-754 binary16 encode/decode for packed sample retrieval
//! - [`wire`] - the 8-byte connection handshake header
//! - [`config`] - TOML configuration for the proxy process
//! - [`client`] - the monitoring-client half of the network protocol

pub mod client;
pub mod config;
pub mod consts;
pub mod half;
pub mod records;
pub mod trigger;
pub mod wire;
