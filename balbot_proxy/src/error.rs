//! Proxy error taxonomy.
//!
//! Device communication failures and device faults are fatal: the loop
//! stops and the shutdown path commands every axis idle. Network stalls
//! and disconnects are not errors at this level; the server handles them
//! per tick.

use thiserror::Error;

use crate::transport::TransportError;
use balbot_common::config::ConfigError;

/// Fatal proxy errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The device transport failed mid-session. A broken serial or USB
    /// link is not safely auto-recoverable inside a live control loop.
    #[error("device communication failure")]
    Communication,

    /// The device reported errors; details were logged by the fault scan.
    #[error("device reported {count} fault(s)")]
    DeviceFault { count: usize },

    /// Connecting to the device failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}
