//! Connection handshake header.
//!
//! On accept the proxy sends 8 bytes: the byte size of one telemetry record
//! and one control record, as two little-endian 32-bit integers, followed
//! by one full control-record snapshot. A client compiled against different
//! record layouts sees mismatching sizes and must disconnect; this is a
//! deliberate size-only compatibility check, not version negotiation; two
//! structurally different layouts of identical size would pass silently.

use crate::records::{CONTROL_RECORD_SIZE, TELEMETRY_RECORD_SIZE};

/// Handshake header length on the wire.
pub const HANDSHAKE_LEN: usize = 8;

/// The decoded handshake header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub telemetry_size: u32,
    pub control_size: u32,
}

impl Handshake {
    /// Header describing the locally compiled record layouts.
    pub fn local() -> Self {
        Self {
            telemetry_size: TELEMETRY_RECORD_SIZE as u32,
            control_size: CONTROL_RECORD_SIZE as u32,
        }
    }

    /// Encode to the 8-byte wire form.
    pub fn encode(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[..4].copy_from_slice(&self.telemetry_size.to_le_bytes());
        buf[4..].copy_from_slice(&self.control_size.to_le_bytes());
        buf
    }

    /// Decode from the 8-byte wire form.
    pub fn decode(buf: &[u8; HANDSHAKE_LEN]) -> Self {
        Self {
            telemetry_size: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            control_size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    /// Whether the peer's declared sizes match the local layouts.
    pub fn matches_local(&self) -> bool {
        *self == Self::local()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
