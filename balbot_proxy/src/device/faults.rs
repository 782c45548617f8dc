//! Watchdog feeding and hierarchical fault scanning.
//!
//! Every tick the device watchdog is fed and a summary any-error flag is
//! queried; when extended firmware is present both happen in one combined
//! endpoint read. A set flag triggers a full scan of every error register
//! (device-global plus the four per-axis registers) so the operator gets a
//! decoded diagnostic before the proxy shuts down; a device fault is
//! fatal, not something the proxy retries around.
//!
//! At startup, watchdog-expiry errors left over from a prior unclean
//! shutdown are auto-cleared; they mean "the proxy was killed", not that
//! the hardware failed. All other pre-existing errors are cleared only
//! when the operator asked for it on the command line.

use core::fmt;

use bitflags::bitflags;
use heapless::Vec as FixedVec;
use tracing::info;

use balbot_common::consts::{AXIS_NAMES, NUM_AXES};

use crate::endpoint::Device;
use crate::transport::EndpointTransport;

bitflags! {
    /// Device-global error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceError: u32 {
        const CONTROL_ITERATION_MISSED  = 0x01;
        const DC_BUS_UNDER_VOLTAGE      = 0x02;
        const DC_BUS_OVER_VOLTAGE       = 0x04;
        const DC_BUS_OVER_REGEN_CURRENT = 0x08;
        const DC_BUS_OVER_CURRENT       = 0x10;
        const BRAKE_DEADTIME_VIOLATION  = 0x20;
        const BRAKE_DUTY_CYCLE_NAN      = 0x40;
        const INVALID_BRAKE_RESISTANCE  = 0x80;
    }

    /// Per-axis error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AxisError: u32 {
        const INVALID_STATE           = 0x0001;
        const WATCHDOG_TIMER_EXPIRED  = 0x0800;
        const MIN_ENDSTOP_PRESSED     = 0x1000;
        const MAX_ENDSTOP_PRESSED     = 0x2000;
        const ESTOP_REQUESTED         = 0x4000;
        const HOMING_WITHOUT_ENDSTOP  = 0x2_0000;
        const OVER_TEMP               = 0x4_0000;
        const UNKNOWN_POSITION        = 0x8_0000;
    }

    /// Per-axis motor error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MotorError: u32 {
        const PHASE_RESISTANCE_OUT_OF_RANGE = 0x0001;
        const PHASE_INDUCTANCE_OUT_OF_RANGE = 0x0002;
        const DRV_FAULT                     = 0x0008;
        const CONTROL_DEADLINE_MISSED       = 0x0010;
        const MODULATION_MAGNITUDE          = 0x0080;
        const CURRENT_SENSE_SATURATION      = 0x0400;
        const CURRENT_LIMIT_VIOLATION       = 0x1000;
        const UNKNOWN_TORQUE                = 0x4_0000;
    }

    /// Per-axis encoder error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EncoderError: u32 {
        const UNSTABLE_GAIN            = 0x01;
        const CPR_POLEPAIRS_MISMATCH   = 0x02;
        const NO_RESPONSE              = 0x04;
        const UNSUPPORTED_ENCODER_MODE = 0x08;
        const ILLEGAL_HALL_STATE       = 0x10;
        const INDEX_NOT_FOUND_YET      = 0x20;
        const ABS_SPI_TIMEOUT          = 0x40;
        const ABS_SPI_NOT_READY        = 0x80;
    }

    /// Per-axis controller error register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControllerError: u32 {
        const OVERSPEED            = 0x01;
        const INVALID_INPUT_MODE   = 0x02;
        const UNSTABLE_GAIN        = 0x04;
        const INVALID_MIRROR_AXIS  = 0x08;
        const INVALID_LOAD_ENCODER = 0x10;
        const INVALID_ESTIMATE     = 0x20;
    }
}

/// One decoded fault found by the hierarchical scan.
#[derive(Debug, Clone)]
pub enum Fault {
    Device(DeviceError),
    Axis { axis: u8, error: AxisError },
    Motor { axis: u8, error: MotorError },
    Encoder { axis: u8, error: EncoderError },
    Controller { axis: u8, error: ControllerError },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device error {e:?}"),
            Self::Axis { axis, error } => write!(f, "axis{axis} error {error:?}"),
            Self::Motor { axis, error } => write!(f, "axis{axis} motor error {error:?}"),
            Self::Encoder { axis, error } => write!(f, "axis{axis} encoder error {error:?}"),
            Self::Controller { axis, error } => {
                write!(f, "axis{axis} controller error {error:?}")
            }
        }
    }
}

/// Fixed-capacity fault scan result; one entry per nonzero register.
pub type FaultList = FixedVec<Fault, 16>;

/// Feed the watchdog and report whether the device flags any error.
///
/// Extended firmware combines feeding both watchdogs and the error summary
/// into a single endpoint to save round trips; base firmware takes one
/// feed call per axis plus the summary read.
pub fn feed_and_check_errors<T: EndpointTransport>(
    dev: &mut Device<T>,
    fw_has_extensions: bool,
) -> bool {
    if fw_has_extensions {
        dev.get::<bool>("any_errors_and_watchdog_feed")
    } else {
        for name in AXIS_NAMES {
            dev.call(&format!("{name}.watchdog_feed"));
        }
        dev.get::<bool>("any_error")
    }
}

/// Hierarchical scan of every error register.
pub fn scan_faults<T: EndpointTransport>(dev: &mut Device<T>) -> FaultList {
    let mut faults = FaultList::new();

    let bits = dev.get::<u32>("error");
    if bits != 0 {
        let _ = faults.push(Fault::Device(DeviceError::from_bits_retain(bits)));
    }

    for (a, name) in AXIS_NAMES.iter().enumerate() {
        let axis = a as u8;
        let bits = dev.get::<u32>(&format!("{name}.error"));
        if bits != 0 {
            let _ = faults.push(Fault::Axis {
                axis,
                error: AxisError::from_bits_retain(bits),
            });
        }
        let bits = dev.get::<u32>(&format!("{name}.motor.error"));
        if bits != 0 {
            let _ = faults.push(Fault::Motor {
                axis,
                error: MotorError::from_bits_retain(bits),
            });
        }
        let bits = dev.get::<u32>(&format!("{name}.encoder.error"));
        if bits != 0 {
            let _ = faults.push(Fault::Encoder {
                axis,
                error: EncoderError::from_bits_retain(bits),
            });
        }
        let bits = dev.get::<u32>(&format!("{name}.controller.error"));
        if bits != 0 {
            let _ = faults.push(Fault::Controller {
                axis,
                error: ControllerError::from_bits_retain(bits),
            });
        }
    }

    faults
}

/// Clear every error register (explicit operator request).
pub fn clear_all_errors<T: EndpointTransport>(dev: &mut Device<T>) {
    dev.set("error", 0u32);
    for name in AXIS_NAMES {
        dev.set(&format!("{name}.error"), 0u32);
        dev.set(&format!("{name}.motor.error"), 0u32);
        dev.set(&format!("{name}.encoder.error"), 0u32);
        dev.set(&format!("{name}.controller.error"), 0u32);
    }
}

/// Clear a pure watchdog-expiry error left by an unclean prior shutdown.
///
/// Only fires when the expiry bit is the *only* bit set, so genuine
/// hardware faults stay visible to the operator.
pub fn clear_stale_watchdog_errors<T: EndpointTransport>(dev: &mut Device<T>) {
    for a in 0..NUM_AXES {
        let path = format!("{}.error", AXIS_NAMES[a]);
        let bits = dev.get::<u32>(&path);
        if bits == AxisError::WATCHDOG_TIMER_EXPIRED.bits() {
            dev.set(&path, 0u32);
            info!(axis = a, "cleared stale watchdog-expiry error");
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
