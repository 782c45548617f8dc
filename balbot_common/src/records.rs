//! The two live data records exchanged between proxy and client.
//!
//! Both records are `#[repr(C)]`, fixed-size and all-numeric (flags are
//! `u8`, never `bool`, so every bit pattern received off the wire is a
//! valid value). Padding is explicit, so the in-memory image has no
//! compiler-inserted holes and can be sent as raw bytes. Sizes are pinned
//! with `const_assert_eq!` and double as the protocol version check: the
//! connection handshake exchanges both sizes and a peer compiled against a
//! different layout is rejected.

use static_assertions::const_assert_eq;

use crate::consts::{DEFAULT_TICK_MS, NUM_AXES, SCOPE_CHUNK};

/// Byte size of one telemetry record on the wire.
pub const TELEMETRY_RECORD_SIZE: usize = core::mem::size_of::<TelemetryRecord>();

/// Byte size of one control record on the wire.
pub const CONTROL_RECORD_SIZE: usize = core::mem::size_of::<ControlRecord>();

const_assert_eq!(TELEMETRY_RECORD_SIZE, 424);
const_assert_eq!(CONTROL_RECORD_SIZE, 260);
const_assert_eq!(core::mem::size_of::<AxisTelemetry>(), 44);
const_assert_eq!(core::mem::size_of::<AxisControl>(), 104);

// ─── Raw byte views ─────────────────────────────────────────────────

/// Records that may be viewed and reconstructed as raw bytes.
///
/// # Safety
/// Implementors must be `#[repr(C)]` with exclusively numeric fields and
/// explicit padding, so that every byte of the in-memory image is
/// initialized and every byte pattern of the full size is a valid value.
pub unsafe trait WireRecord: Copy + Sized {
    /// The record as its exact wire image.
    fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C), fully initialized, no implicit padding (trait
        // contract).
        unsafe {
            core::slice::from_raw_parts(
                (self as *const Self).cast::<u8>(),
                core::mem::size_of::<Self>(),
            )
        }
    }

    /// Overwrite the record from one full wire image.
    fn read_bytes(&mut self, bytes: &[u8]) {
        assert_eq!(bytes.len(), core::mem::size_of::<Self>());
        // SAFETY: length checked above; any bit pattern is valid (trait
        // contract).
        unsafe {
            core::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                (self as *mut Self).cast::<u8>(),
                core::mem::size_of::<Self>(),
            );
        }
    }
}

unsafe impl WireRecord for TelemetryRecord {}
unsafe impl WireRecord for ControlRecord {}

// ─── Oscilloscope capture state ─────────────────────────────────────

/// State of the on-device oscilloscope capture protocol, stored in the
/// telemetry record as a raw `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ScopeState {
    /// No capture active; a trigger is accepted only here.
    Idle = 0,
    /// Device is sampling into its ring buffer.
    Recording = 1,
    /// Device finished sampling; total size not yet fetched.
    RecordingDone = 2,
    /// Samples are being pulled down in bounded chunks.
    Transmitting = 3,
}

impl ScopeState {
    /// Decode from the raw telemetry field; unknown values map to Idle.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Recording,
            2 => Self::RecordingDone,
            3 => Self::Transmitting,
            _ => Self::Idle,
        }
    }
}

// ─── Telemetry (proxy → client, one per tick) ───────────────────────

/// Per-axis slice of the telemetry snapshot.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct AxisTelemetry {
    /// Encoder position estimate [turns].
    pub pos: f32,
    /// Encoder velocity estimate [turns/s].
    pub vel: f32,
    /// Proxy-side coarse velocity: position delta over tick delta [turns/s].
    pub vel_coarse: f32,
    /// Commanded q-axis current [A].
    pub current_target: f32,
    /// Setpoint echoed for the active control mode; the other two are zero.
    pub input_pos: f32,
    pub input_vel: f32,
    /// Torque setpoint echo [Nm].
    pub input_torque: f32,
    /// Cumulative encoder index check error (extended firmware only).
    pub encoder_index_error: f32,
    /// Encoder index observation count (extended firmware only).
    pub encoder_index_count: i32,
    /// Raw encoder shadow count.
    pub encoder_shadow_count: i32,
    /// Axis is commanded into closed-loop control (0/1).
    pub is_running: u8,
    /// Encoder reported ready, index policy satisfied (0/1).
    pub encoder_ready: u8,
    /// Motor calibration valid on the device (0/1).
    pub motor_is_calibrated: u8,
    /// Anticogging table valid on the device (0/1).
    pub anticogging_valid: u8,
}

/// The telemetry snapshot, overwritten every tick and streamed append-only.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TelemetryRecord {
    /// Microseconds since proxy start.
    pub uptime_micros: u64,
    /// Wall-clock seconds since the UNIX epoch.
    pub local_time: i64,
    /// Device serial number (immutable, read once at init).
    pub serial_number: u64,
    /// Proxy tick counter.
    pub tick: u32,
    /// Device-side loop counter (extended firmware only).
    pub device_counter: i32,
    /// Measured time of the previous tick [s].
    pub delta_time: f32,
    /// Device-update phase duration [µs].
    pub delta_time_device_us: u32,
    /// Network-update phase duration [µs].
    pub delta_time_network_us: u32,
    /// End-of-tick sleep duration [µs].
    pub delta_time_sleep_us: u32,
    /// DC bus voltage [V].
    pub bus_voltage: f32,
    /// DC bus current [A].
    pub bus_current: f32,
    /// Firmware version, packed major<<16 | minor<<8 | revision.
    pub fw_version: u32,
    pub hw_version_major: u8,
    pub hw_version_minor: u8,
    pub hw_version_variant: u8,
    /// Firmware exposes the extended endpoint set (0/1).
    pub fw_has_extensions: u8,
    /// Raw [`ScopeState`].
    pub scope_state: u32,
    /// Capture window start index (inclusive).
    pub scope_start: i32,
    /// Capture window end index (exclusive).
    pub scope_end: i32,
    /// Decoded samples for the window `[scope_start, scope_end)`.
    pub scope_samples: [f32; SCOPE_CHUNK],
    pub axes: [AxisTelemetry; NUM_AXES],
    pub _pad: [u8; 4],
}

impl Default for TelemetryRecord {
    fn default() -> Self {
        // SAFETY: all fields are numeric; all-zeros is valid.
        unsafe { core::mem::zeroed() }
    }
}

// ─── Control (client → proxy → device, desired state) ───────────────

/// Per-axis desired state plus the full device configuration mirror.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct AxisControl {
    /// Axis is managed at all (0/1); disabled axes are held idle.
    pub enable_axis: u8,
    /// Axis should run closed-loop (0/1).
    pub enable_motor: u8,
    pub motor_pre_calibrated: u8,
    pub encoder_use_index: u8,
    pub encoder_pre_calibrated: u8,
    pub enable_anticogging: u8,
    pub enable_vel_limit: u8,
    pub enable_overspeed_error: u8,
    /// Extended firmware only.
    pub encoder_ignore_abs_ams_error: u8,
    pub _pad: [u8; 3],
    /// One of the `CONTROL_MODE_*` constants.
    pub control_mode: i32,
    pub input_mode: i32,
    /// Setpoint for the selected control mode.
    pub input_pos: f32,
    pub input_vel: f32,
    pub input_torque: f32,
    // Device configuration mirror (motor / controller / encoder).
    pub pole_pairs: i32,
    pub torque_constant: f32,
    pub current_lim: f32,
    pub current_lim_margin: f32,
    pub requested_current_range: f32,
    pub pos_gain: f32,
    pub vel_gain: f32,
    pub vel_integrator_gain: f32,
    pub vel_limit: f32,
    pub vel_limit_tolerance: f32,
    pub input_filter_bandwidth: f32,
    pub encoder_mode: i32,
    pub encoder_cpr: i32,
    pub encoder_bandwidth: f32,
    pub encoder_abs_spi_cs_gpio_pin: i32,
    /// Bumped whenever any field of the config mirror above changed.
    pub config_counter: u32,
    /// One-shot: request a full calibration sequence.
    pub calibration_trigger: u32,
    /// One-shot: request an encoder index search.
    pub index_search_trigger: u32,
}

/// The desired-state record, synchronized whole from the client and
/// partially mirrored to the device.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ControlRecord {
    /// Top-level change counter; gates the client's re-send.
    pub counter: u32,
    /// Bumped whenever any global device setting below changed.
    pub settings_counter: u32,
    /// One-shot: persist device configuration to flash.
    pub save_config_trigger: u32,
    /// One-shot: reboot the device.
    pub reboot_trigger: u32,
    /// One-shot: force an oscilloscope capture.
    pub scope_trigger: u32,
    /// Target control-loop cadence [ms].
    pub target_tick_ms: f32,
    // Global device settings mirror.
    pub max_regen_current: f32,
    pub brake_resistance: f32,
    pub dc_max_positive_current: f32,
    pub dc_max_negative_current: f32,
    /// Extended firmware only.
    pub uart_baudrate: u32,
    pub ibus_report_filter_k: f32,
    /// Disable all motors when the monitoring client disconnects (0/1).
    pub stop_motors_on_disconnect: u8,
    /// Extended firmware only.
    pub generate_error_on_filtered_ibus: u8,
    pub _pad: [u8; 2],
    pub axes: [AxisControl; NUM_AXES],
}

impl Default for ControlRecord {
    fn default() -> Self {
        // SAFETY: all fields are numeric; all-zeros is valid.
        let mut record: Self = unsafe { core::mem::zeroed() };
        record.target_tick_ms = DEFAULT_TICK_MS;
        record.stop_motors_on_disconnect = 1;
        record
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_are_pinned() {
        assert_eq!(TELEMETRY_RECORD_SIZE, 424);
        assert_eq!(CONTROL_RECORD_SIZE, 260);
    }

    #[test]
    fn telemetry_byte_roundtrip() {
        let mut t = TelemetryRecord::default();
        t.tick = 42;
        t.bus_voltage = 23.9;
        t.axes[1].pos = -1.5;
        t.axes[1].is_running = 1;
        t.scope_samples[SCOPE_CHUNK - 1] = 7.25;

        let bytes = t.as_bytes().to_vec();
        assert_eq!(bytes.len(), TELEMETRY_RECORD_SIZE);

        let mut back = TelemetryRecord::default();
        back.read_bytes(&bytes);
        assert_eq!(back.tick, 42);
        assert_eq!(back.bus_voltage, 23.9);
        assert_eq!(back.axes[1].pos, -1.5);
        assert_eq!(back.axes[1].is_running, 1);
        assert_eq!(back.scope_samples[SCOPE_CHUNK - 1], 7.25);
    }

    #[test]
    fn control_byte_roundtrip() {
        let mut c = ControlRecord::default();
        c.counter = 3;
        c.axes[0].enable_motor = 1;
        c.axes[0].pole_pairs = 7;
        c.axes[1].index_search_trigger = 9;

        let bytes = c.as_bytes().to_vec();
        assert_eq!(bytes.len(), CONTROL_RECORD_SIZE);

        let mut back = ControlRecord::default();
        back.read_bytes(&bytes);
        assert_eq!(back.counter, 3);
        assert_eq!(back.axes[0].enable_motor, 1);
        assert_eq!(back.axes[0].pole_pairs, 7);
        assert_eq!(back.axes[1].index_search_trigger, 9);
    }

    #[test]
    fn control_defaults() {
        let c = ControlRecord::default();
        assert_eq!(c.target_tick_ms, DEFAULT_TICK_MS);
        assert_eq!(c.stop_motors_on_disconnect, 1);
        assert_eq!(c.counter, 0);
    }

    #[test]
    fn scope_state_raw_mapping() {
        assert_eq!(ScopeState::from_raw(0), ScopeState::Idle);
        assert_eq!(ScopeState::from_raw(1), ScopeState::Recording);
        assert_eq!(ScopeState::from_raw(2), ScopeState::RecordingDone);
        assert_eq!(ScopeState::from_raw(3), ScopeState::Transmitting);
        assert_eq!(ScopeState::from_raw(99), ScopeState::Idle);
    }
}
