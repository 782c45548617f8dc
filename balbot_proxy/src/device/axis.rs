//! Per-axis state machines: run/stop, calibration, encoder index search.
//!
//! The proxy owns only the Idle ↔ ClosedLoopControl decision; transient
//! calibration and search states run on the device and are reported back
//! as readiness booleans. Calibration and index search are edge-triggered
//! one-shots carried as counters in the control record.

use balbot_common::consts::{
    AXIS_NAMES, AXIS_STATE_CLOSED_LOOP_CONTROL, AXIS_STATE_ENCODER_INDEX_SEARCH,
    AXIS_STATE_FULL_CALIBRATION_SEQUENCE, AXIS_STATE_IDLE, CONTROL_MODE_POSITION,
    CONTROL_MODE_TORQUE, CONTROL_MODE_VELOCITY,
};
use balbot_common::records::{AxisControl, AxisTelemetry};
use balbot_common::trigger::EdgeTrigger;
use tracing::info;

use crate::endpoint::Device;
use crate::transport::EndpointTransport;

/// State machine owner for one axis.
#[derive(Debug)]
pub struct AxisMachine {
    axis: usize,
    calibration: EdgeTrigger,
    index_search: EdgeTrigger,
}

impl AxisMachine {
    pub fn new(axis: usize) -> Self {
        Self {
            axis,
            calibration: EdgeTrigger::new(),
            index_search: EdgeTrigger::new(),
        }
    }

    fn path(&self, tail: &str) -> String {
        format!("{}.{tail}", AXIS_NAMES[self.axis])
    }

    /// Adopt current trigger counters without firing (startup).
    pub fn sync_triggers(&mut self, ctl: &AxisControl) {
        self.calibration.sync(ctl.calibration_trigger);
        self.index_search.sync(ctl.index_search_trigger);
    }

    /// Latch readiness flags reported by the device.
    ///
    /// `encoder_ready` requires the encoder to report ready and, when an
    /// index search is configured, the index to have been found as well.
    pub fn update_readiness<T: EndpointTransport>(
        &self,
        dev: &mut Device<T>,
        tel: &mut AxisTelemetry,
        ctl: &AxisControl,
    ) {
        if tel.encoder_ready == 0
            && dev.get::<bool>(&self.path("encoder.is_ready"))
            && (ctl.encoder_use_index == 0 || dev.get::<bool>(&self.path("encoder.index_found")))
        {
            tel.encoder_ready = 1;
        }
        if tel.motor_is_calibrated == 0 && dev.get::<bool>(&self.path("motor.is_calibrated")) {
            tel.motor_is_calibrated = 1;
        }
    }

    /// Edge-fire an encoder index search; only honored while stopped.
    pub fn handle_index_search<T: EndpointTransport>(
        &mut self,
        dev: &mut Device<T>,
        tel: &mut AxisTelemetry,
        ctl: &AxisControl,
    ) {
        let fired = self.index_search.observe(ctl.index_search_trigger);
        if fired && tel.is_running == 0 {
            info!(axis = self.axis, "starting encoder index search");
            tel.encoder_ready = 0;
            dev.set(&self.path("requested_state"), AXIS_STATE_ENCODER_INDEX_SEARCH);
        }
    }

    /// Edge-fire a full calibration sequence; only honored while stopped.
    ///
    /// The device recomputes readiness, so the cached flags are cleared
    /// and re-latched from device reports.
    pub fn handle_calibration<T: EndpointTransport>(
        &mut self,
        dev: &mut Device<T>,
        tel: &mut AxisTelemetry,
        ctl: &AxisControl,
    ) {
        let fired = self.calibration.observe(ctl.calibration_trigger);
        if fired && tel.is_running == 0 {
            info!(axis = self.axis, "starting full calibration sequence");
            dev.set(
                &self.path("requested_state"),
                AXIS_STATE_FULL_CALIBRATION_SEQUENCE,
            );
            tel.encoder_ready = 0;
            tel.motor_is_calibrated = 0;
            tel.anticogging_valid = 0;
        }
    }

    /// Apply run/stop and setpoints, then read the sensor block back.
    pub fn apply<T: EndpointTransport>(
        &mut self,
        dev: &mut Device<T>,
        tel: &mut AxisTelemetry,
        ctl: &AxisControl,
        delta_time: f32,
    ) {
        let should_run = ctl.enable_motor != 0;
        if should_run != (tel.is_running != 0) {
            if should_run {
                // Closed loop is requested only once the device confirms
                // readiness; until then the level-triggered desired state
                // is re-evaluated every tick.
                if tel.encoder_ready != 0 && tel.motor_is_calibrated != 0 {
                    dev.set(&self.path("requested_state"), AXIS_STATE_CLOSED_LOOP_CONTROL);
                    tel.is_running = 1;
                }
            } else {
                dev.set(&self.path("requested_state"), AXIS_STATE_IDLE);
                tel.is_running = 0;
            }
        }

        // Route the setpoint for the active control mode; telemetry echoes
        // only that one.
        tel.input_torque = 0.0;
        tel.input_vel = 0.0;
        tel.input_pos = 0.0;
        match ctl.control_mode {
            CONTROL_MODE_TORQUE => {
                dev.set(&self.path("controller.input_torque"), ctl.input_torque);
                tel.input_torque = ctl.input_torque;
            }
            CONTROL_MODE_VELOCITY => {
                dev.set(&self.path("controller.input_vel"), ctl.input_vel);
                tel.input_vel = ctl.input_vel;
            }
            CONTROL_MODE_POSITION => {
                dev.set(&self.path("controller.input_pos"), ctl.input_pos);
                tel.input_pos = ctl.input_pos;
            }
            _ => {}
        }

        let old_pos = tel.pos;
        tel.pos = dev.get(&self.path("encoder.pos_estimate"));
        tel.vel_coarse = if delta_time > 0.0 {
            (tel.pos - old_pos) / delta_time
        } else {
            0.0
        };
        tel.vel = dev.get(&self.path("encoder.vel_estimate"));
        tel.current_target = dev.get(&self.path("motor.current_control.Iq_setpoint"));
    }

    /// Hold a disabled axis idle and zero its exposed readings.
    pub fn force_idle<T: EndpointTransport>(
        &self,
        dev: &mut Device<T>,
        tel: &mut AxisTelemetry,
    ) {
        if tel.is_running != 0 {
            dev.set(&self.path("requested_state"), AXIS_STATE_IDLE);
            tel.is_running = 0;
        }
        tel.pos = 0.0;
        tel.vel = 0.0;
        tel.vel_coarse = 0.0;
        tel.current_target = 0.0;
        tel.input_pos = 0.0;
        tel.input_vel = 0.0;
        tel.input_torque = 0.0;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
