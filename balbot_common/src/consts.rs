//! Shared constants: axis layout, device enumerations, protocol defaults.

/// Number of independently controlled motor axes (one per leg).
pub const NUM_AXES: usize = 2;

/// Endpoint path prefix per axis.
pub const AXIS_NAMES: [&str; NUM_AXES] = ["axis0", "axis1"];

/// Maximum oscilloscope samples transferred per tick.
///
/// Bounds the per-tick device round trips during bulk retrieval so the
/// control cadence is never starved by a large capture.
pub const SCOPE_CHUNK: usize = 64;

/// Interleaved oscilloscope channels per logical capture step:
/// position, current target, velocity and input velocity for both axes.
pub const SCOPE_CHANNELS: usize = 8;

/// Default TCP listen port for monitoring clients.
pub const DEFAULT_PORT: u16 = 9400;

/// Default control-loop cadence [ms].
pub const DEFAULT_TICK_MS: f32 = 4.0;

/// Default UART baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default number of UART stop bits.
pub const DEFAULT_STOP_BITS: u8 = 2;

/// Device watchdog timeout armed at startup [s].
pub const DEFAULT_WATCHDOG_TIMEOUT_S: f32 = 1.0;

/// Default bound on start-sentinel polls before an oscilloscope trigger
/// is abandoned.
pub const DEFAULT_SCOPE_POLL_LIMIT: u32 = 1000;

// ─── Device state enumeration (`requested_state` / `current_state`) ─

pub const AXIS_STATE_IDLE: i32 = 1;
pub const AXIS_STATE_FULL_CALIBRATION_SEQUENCE: i32 = 3;
pub const AXIS_STATE_ENCODER_INDEX_SEARCH: i32 = 6;
pub const AXIS_STATE_CLOSED_LOOP_CONTROL: i32 = 8;

// ─── Controller input modes (`controller.config.control_mode`) ──────

pub const CONTROL_MODE_VOLTAGE: i32 = 0;
pub const CONTROL_MODE_TORQUE: i32 = 1;
pub const CONTROL_MODE_VELOCITY: i32 = 2;
pub const CONTROL_MODE_POSITION: i32 = 3;

// ─── Oscilloscope capture counter sentinels ─────────────────────────

/// Set by the device once a capture actually started.
pub const SCOPE_STARTED_BIT: i64 = 1 << 62;

/// Set by the device once an in-progress capture completed.
pub const SCOPE_DONE_BIT: i64 = 1 << 61;
