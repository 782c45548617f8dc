//! Control-data synchronizer.
//!
//! Writing every mirrored configuration field to the device every tick
//! would blow the control cadence, so changes are detected through two
//! independent counter tracks: the global settings group and one group per
//! axis (the expensive motor/controller/encoder batch). The cached
//! last-applied counter is the sole dirty check; when it differs from the
//! live counter the whole group is rewritten in one pass and the cache
//! updated. Several edits landing within one tick therefore collapse into
//! a single device write, last value wins; the device only has to
//! eventually reflect the latest value, not every intermediate one.

use balbot_common::consts::{AXIS_NAMES, NUM_AXES};
use balbot_common::records::ControlRecord;
use tracing::debug;

use crate::endpoint::Device;
use crate::transport::EndpointTransport;

/// Cached last-applied counters for both dirty tracks.
#[derive(Debug, Default)]
pub struct ControlSync {
    settings_applied: u32,
    axis_applied: [u32; NUM_AXES],
}

impl ControlSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt the current counters without writing, so values just read
    /// back from the device are not immediately re-applied.
    pub fn seed(&mut self, control: &ControlRecord) {
        self.settings_applied = control.settings_counter;
        for a in 0..NUM_AXES {
            self.axis_applied[a] = control.axes[a].config_counter;
        }
    }

    /// Push the global settings group if its counter moved.
    pub fn apply_settings<T: EndpointTransport>(
        &mut self,
        dev: &mut Device<T>,
        control: &ControlRecord,
        fw_has_extensions: bool,
    ) {
        if self.settings_applied == control.settings_counter {
            return;
        }
        debug!(counter = control.settings_counter, "writing global settings group");
        write_settings(dev, control, fw_has_extensions);
        self.settings_applied = control.settings_counter;
    }

    /// Push one axis configuration group if its counter moved.
    pub fn apply_axis_config<T: EndpointTransport>(
        &mut self,
        dev: &mut Device<T>,
        control: &ControlRecord,
        axis: usize,
        fw_has_extensions: bool,
    ) {
        if self.axis_applied[axis] == control.axes[axis].config_counter {
            return;
        }
        debug!(
            axis,
            counter = control.axes[axis].config_counter,
            "writing axis config group"
        );
        write_axis_config(dev, control, axis, fw_has_extensions);
        self.axis_applied[axis] = control.axes[axis].config_counter;
    }
}

/// Read the global settings group from the device into the mirror.
pub fn read_settings<T: EndpointTransport>(
    dev: &mut Device<T>,
    control: &mut ControlRecord,
    fw_has_extensions: bool,
) {
    control.max_regen_current = dev.get("config.max_regen_current");
    control.brake_resistance = dev.get("config.brake_resistance");
    control.dc_max_positive_current = dev.get("config.dc_max_positive_current");
    control.dc_max_negative_current = dev.get("config.dc_max_negative_current");
    control.ibus_report_filter_k = dev.get("ibus_report_filter_k");
    if fw_has_extensions {
        control.uart_baudrate = dev.get("config.uart_baudrate");
        control.generate_error_on_filtered_ibus =
            dev.get::<bool>("generate_error_on_filtered_ibus") as u8;
    }
}

/// Write the whole global settings group.
fn write_settings<T: EndpointTransport>(
    dev: &mut Device<T>,
    control: &ControlRecord,
    fw_has_extensions: bool,
) {
    dev.set("config.max_regen_current", control.max_regen_current);
    dev.set("config.brake_resistance", control.brake_resistance);
    dev.set("config.dc_max_positive_current", control.dc_max_positive_current);
    dev.set("config.dc_max_negative_current", control.dc_max_negative_current);
    dev.set("ibus_report_filter_k", control.ibus_report_filter_k);
    if fw_has_extensions {
        dev.set("config.uart_baudrate", control.uart_baudrate);
        dev.set(
            "generate_error_on_filtered_ibus",
            control.generate_error_on_filtered_ibus != 0,
        );
    }
}

/// Read one axis configuration group from the device into the mirror.
pub fn read_axis_config<T: EndpointTransport>(
    dev: &mut Device<T>,
    control: &mut ControlRecord,
    axis: usize,
    fw_has_extensions: bool,
) {
    let name = AXIS_NAMES[axis];
    let ac = &mut control.axes[axis];

    // motor
    ac.motor_pre_calibrated = dev.get::<bool>(&format!("{name}.motor.config.pre_calibrated")) as u8;
    ac.pole_pairs = dev.get(&format!("{name}.motor.config.pole_pairs"));
    ac.torque_constant = dev.get(&format!("{name}.motor.config.torque_constant"));
    ac.current_lim = dev.get(&format!("{name}.motor.config.current_lim"));
    ac.current_lim_margin = dev.get(&format!("{name}.motor.config.current_lim_margin"));
    ac.requested_current_range = dev.get(&format!("{name}.motor.config.requested_current_range"));

    // controller
    ac.control_mode = dev.get(&format!("{name}.controller.config.control_mode"));
    ac.input_mode = dev.get(&format!("{name}.controller.config.input_mode"));
    ac.pos_gain = dev.get(&format!("{name}.controller.config.pos_gain"));
    ac.vel_gain = dev.get(&format!("{name}.controller.config.vel_gain"));
    ac.vel_integrator_gain = dev.get(&format!("{name}.controller.config.vel_integrator_gain"));
    ac.vel_limit = dev.get(&format!("{name}.controller.config.vel_limit"));
    ac.vel_limit_tolerance = dev.get(&format!("{name}.controller.config.vel_limit_tolerance"));
    ac.input_filter_bandwidth =
        dev.get(&format!("{name}.controller.config.input_filter_bandwidth"));
    ac.enable_anticogging =
        dev.get::<bool>(&format!("{name}.controller.config.anticogging.anticogging_enabled")) as u8;
    ac.enable_vel_limit =
        dev.get::<bool>(&format!("{name}.controller.config.enable_vel_limit")) as u8;
    ac.enable_overspeed_error =
        dev.get::<bool>(&format!("{name}.controller.config.enable_overspeed_error")) as u8;

    // encoder
    ac.encoder_mode = dev.get(&format!("{name}.encoder.config.mode"));
    ac.encoder_use_index = dev.get::<bool>(&format!("{name}.encoder.config.use_index")) as u8;
    ac.encoder_pre_calibrated =
        dev.get::<bool>(&format!("{name}.encoder.config.pre_calibrated")) as u8;
    ac.encoder_cpr = dev.get(&format!("{name}.encoder.config.cpr"));
    ac.encoder_bandwidth = dev.get(&format!("{name}.encoder.config.bandwidth"));
    ac.encoder_abs_spi_cs_gpio_pin =
        dev.get(&format!("{name}.encoder.config.abs_spi_cs_gpio_pin"));
    if fw_has_extensions {
        ac.encoder_ignore_abs_ams_error =
            dev.get::<bool>(&format!("{name}.encoder.config.ignore_abs_ams_error_flag")) as u8;
    }
}

/// Write the whole configuration group of one axis.
fn write_axis_config<T: EndpointTransport>(
    dev: &mut Device<T>,
    control: &ControlRecord,
    axis: usize,
    fw_has_extensions: bool,
) {
    let name = AXIS_NAMES[axis];
    let ac = &control.axes[axis];

    // motor
    dev.set(
        &format!("{name}.motor.config.pre_calibrated"),
        ac.motor_pre_calibrated != 0,
    );
    dev.set(&format!("{name}.motor.config.pole_pairs"), ac.pole_pairs);
    dev.set(&format!("{name}.motor.config.torque_constant"), ac.torque_constant);
    dev.set(&format!("{name}.motor.config.current_lim"), ac.current_lim);
    dev.set(&format!("{name}.motor.config.current_lim_margin"), ac.current_lim_margin);
    dev.set(
        &format!("{name}.motor.config.requested_current_range"),
        ac.requested_current_range,
    );

    // controller
    dev.set(&format!("{name}.controller.config.control_mode"), ac.control_mode);
    dev.set(&format!("{name}.controller.config.input_mode"), ac.input_mode);
    dev.set(&format!("{name}.controller.config.pos_gain"), ac.pos_gain);
    dev.set(&format!("{name}.controller.config.vel_gain"), ac.vel_gain);
    dev.set(
        &format!("{name}.controller.config.vel_integrator_gain"),
        ac.vel_integrator_gain,
    );
    dev.set(&format!("{name}.controller.config.vel_limit"), ac.vel_limit);
    dev.set(
        &format!("{name}.controller.config.vel_limit_tolerance"),
        ac.vel_limit_tolerance,
    );
    dev.set(
        &format!("{name}.controller.config.input_filter_bandwidth"),
        ac.input_filter_bandwidth,
    );
    dev.set(
        &format!("{name}.controller.config.anticogging.anticogging_enabled"),
        ac.enable_anticogging != 0,
    );
    dev.set(
        &format!("{name}.controller.config.enable_vel_limit"),
        ac.enable_vel_limit != 0,
    );
    dev.set(
        &format!("{name}.controller.config.enable_overspeed_error"),
        ac.enable_overspeed_error != 0,
    );

    // encoder
    dev.set(&format!("{name}.encoder.config.mode"), ac.encoder_mode);
    dev.set(&format!("{name}.encoder.config.use_index"), ac.encoder_use_index != 0);
    dev.set(
        &format!("{name}.encoder.config.pre_calibrated"),
        ac.encoder_pre_calibrated != 0,
    );
    dev.set(&format!("{name}.encoder.config.cpr"), ac.encoder_cpr);
    dev.set(&format!("{name}.encoder.config.bandwidth"), ac.encoder_bandwidth);
    dev.set(
        &format!("{name}.encoder.config.abs_spi_cs_gpio_pin"),
        ac.encoder_abs_spi_cs_gpio_pin,
    );
    if fw_has_extensions {
        dev.set(
            &format!("{name}.encoder.config.ignore_abs_ams_error_flag"),
            ac.encoder_ignore_abs_ams_error != 0,
        );
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
