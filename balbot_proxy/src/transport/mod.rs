//! Device endpoint transport.
//!
//! The motor controller exposes a tree of named properties addressed by
//! dot-paths (`axis0.motor.config.pole_pairs`). A transport carries one
//! synchronous request/response exchange per operation; values cross the
//! link as text and are typed one layer up in [`crate::endpoint`].
//!
//! The link-layer byte framing is deliberately pluggable: [`serial`]
//! implements the reference ASCII line protocol over a serial port, and
//! [`mock`] is a scriptable in-memory device for tests.

pub mod mock;
pub mod serial;

pub use serial::SerialTransport;

use thiserror::Error;

/// Transport-level failures. Any of these latches the device client's
/// persistent communication-error flag.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No matching USB device found during autodiscovery.
    #[error("no motor controller found on USB")]
    DeviceNotFound,

    /// The device did not answer within the link timeout.
    #[error("device timeout on {path}")]
    Timeout { path: String },

    /// The device rejected the request.
    #[error("device rejected request on {path}: {reply}")]
    Rejected { path: String, reply: String },
}

/// One synchronous request/response endpoint link.
pub trait EndpointTransport {
    /// Read the value of a named property.
    fn read_value(&mut self, path: &str) -> Result<String, TransportError>;

    /// Write the value of a named property.
    fn write_value(&mut self, path: &str, value: &str) -> Result<(), TransportError>;

    /// Invoke a callable endpoint with an optional argument; returns the
    /// result text (empty for void functions).
    fn call(&mut self, path: &str, arg: Option<&str>) -> Result<String, TransportError>;
}
