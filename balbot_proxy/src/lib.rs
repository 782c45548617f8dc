//! # balbot Proxy Library
//!
//! Bridges the balancing robot's motor controller (USB or UART serial,
//! exposing a tree of named properties) to a TCP monitoring client.
//!
//! The core is a single-threaded fixed-cadence loop: each tick reads
//! sensors and advances the per-axis state machines over the device link,
//! feeds the device watchdog, then drains control updates from the network
//! peer and streams one telemetry snapshot back - never blocking on a slow
//! or disconnected peer.
//!
//! - [`transport`] - the serial endpoint transport and a scriptable mock
//! - [`endpoint`] - typed get/set/call access to device endpoints
//! - [`device`] - synchronizer, axis state machines, oscilloscope, faults
//! - [`server`] - the telemetry/control TCP server
//! - [`sched`] - the fixed-cadence loop and shutdown ordering

pub mod device;
pub mod endpoint;
pub mod error;
pub mod sched;
pub mod server;
pub mod transport;
