//! Device-side control: startup handshake, the per-tick update that fills
//! the telemetry record from the endpoint tree, and safe shutdown.

pub mod axis;
pub mod faults;
pub mod scope;
pub mod sync;

use std::time::Instant;

use balbot_common::consts::{AXIS_NAMES, AXIS_STATE_IDLE, NUM_AXES};
use balbot_common::records::{ControlRecord, TelemetryRecord};
use balbot_common::trigger::EdgeTrigger;
use tracing::{error, info, warn};

use crate::endpoint::Device;
use crate::error::ProxyError;
use crate::transport::EndpointTransport;

use axis::AxisMachine;
use faults::{clear_all_errors, clear_stale_watchdog_errors, feed_and_check_errors, scan_faults};
use scope::ScopeCapture;
use sync::ControlSync;

/// Startup policy knobs, resolved from config file and CLI.
#[derive(Debug, Clone, Copy)]
pub struct DeviceOptions {
    /// Clear all pre-existing device faults during init. When false only
    /// stale watchdog expiries are cleared and everything else is kept
    /// visible for the operator.
    pub clear_errors_on_startup: bool,
    /// Watchdog timeout armed on each axis [s].
    pub watchdog_timeout_s: f32,
    /// Poll bound while waiting for the oscilloscope start sentinel.
    pub scope_start_poll_limit: u32,
}

/// Owner of the device link and all per-device state machines.
pub struct DeviceController<T: EndpointTransport> {
    dev: Device<T>,
    sync: ControlSync,
    axes: [AxisMachine; NUM_AXES],
    scope: ScopeCapture,
    save_config: EdgeTrigger,
    reboot: EdgeTrigger,
    fw_has_extensions: bool,
}

impl<T: EndpointTransport> DeviceController<T> {
    /// Bring the device up: disarm the watchdog, clear stale faults, read
    /// identity and the full configuration mirror, then re-arm the
    /// watchdog. Fails early when the link or the device is unhealthy.
    pub fn init(
        transport: T,
        tel: &mut TelemetryRecord,
        control: &mut ControlRecord,
        opts: &DeviceOptions,
    ) -> Result<Self, ProxyError> {
        let mut dev = Device::new(transport);

        // Disarm first so a watchdog armed by a previous run cannot trip
        // while init is still reading configuration.
        for (a, name) in AXIS_NAMES.iter().enumerate() {
            dev.set(&format!("{name}.config.enable_watchdog"), false);
            tel.axes[a].is_running = 0;
            tel.axes[a].encoder_ready = 0;
            tel.axes[a].motor_is_calibrated = 0;
        }

        if opts.clear_errors_on_startup {
            clear_all_errors(&mut dev);
        } else {
            // A watchdog expiry left over from an unclean shutdown means
            // "proxy was killed", not a hardware fault.
            clear_stale_watchdog_errors(&mut dev);
        }

        tel.serial_number = dev.get("serial_number");
        tel.hw_version_major = dev.get::<u32>("hw_version_major") as u8;
        tel.hw_version_minor = dev.get::<u32>("hw_version_minor") as u8;
        tel.hw_version_variant = dev.get::<u32>("hw_version_variant") as u8;
        let fw_major: u32 = dev.get("fw_version_major");
        let fw_minor: u32 = dev.get("fw_version_minor");
        let fw_revision: u32 = dev.get("fw_version_revision");
        tel.fw_version = fw_major << 16 | fw_minor << 8 | fw_revision;
        let fw_has_extensions = dev.get::<u32>("fw_version_unreleased") != 0;
        tel.fw_has_extensions = fw_has_extensions as u8;
        info!(
            serial = format_args!("{:012X}", tel.serial_number),
            fw = format_args!("{fw_major}.{fw_minor}.{fw_revision}"),
            extended = fw_has_extensions,
            "device identified"
        );

        // Populate the control mirror from the device so the first client
        // sees real values, and seed the dirty tracking so nothing is
        // immediately written back.
        sync::read_settings(&mut dev, control, fw_has_extensions);
        for a in 0..NUM_AXES {
            sync::read_axis_config(&mut dev, control, a, fw_has_extensions);
        }
        let mut sync = ControlSync::new();
        sync.seed(control);

        let mut axes = [AxisMachine::new(0), AxisMachine::new(1)];
        for a in 0..NUM_AXES {
            axes[a].sync_triggers(&control.axes[a]);
            // Initial sensor pass so a broken endpoint fails init, not
            // the first tick.
            axes[a].apply(&mut dev, &mut tel.axes[a], &control.axes[a], 0.0);
        }
        let mut scope = ScopeCapture::new(opts.scope_start_poll_limit);
        scope.sync_trigger(control);
        let mut save_config = EdgeTrigger::new();
        save_config.sync(control.save_config_trigger);
        let mut reboot = EdgeTrigger::new();
        reboot.sync(control.reboot_trigger);

        for name in AXIS_NAMES {
            dev.set(&format!("{name}.config.watchdog_timeout"), opts.watchdog_timeout_s);
            dev.call(&format!("{name}.watchdog_feed"));
            dev.set(&format!("{name}.config.enable_watchdog"), true);
        }

        let mut controller = Self {
            dev,
            sync,
            axes,
            scope,
            save_config,
            reboot,
            fw_has_extensions,
        };
        controller.check()?;
        Ok(controller)
    }

    /// One control-loop tick against the device.
    pub fn update(
        &mut self,
        tel: &mut TelemetryRecord,
        control: &mut ControlRecord,
    ) -> Result<(), ProxyError> {
        let started = Instant::now();

        // Pushing configuration is slow, so it happens only when the
        // client bumped the matching counter.
        self.sync
            .apply_settings(&mut self.dev, control, self.fw_has_extensions);

        if self.fw_has_extensions && tel.scope_state == 0 {
            let counter: i32 = self.dev.get("axis0.loop_counter");
            if counter == tel.device_counter {
                warn!(counter, "device loop counter did not advance");
            } else if counter < tel.device_counter {
                warn!(
                    old = tel.device_counter,
                    new = counter,
                    "device loop counter wrapped"
                );
            }
            tel.device_counter = counter;
        }

        self.scope
            .update(&mut self.dev, tel, control, self.fw_has_extensions);

        for a in 0..NUM_AXES {
            if control.axes[a].enable_axis != 0 {
                self.sync
                    .apply_axis_config(&mut self.dev, control, a, self.fw_has_extensions);
                let machine = &mut self.axes[a];
                machine.update_readiness(&mut self.dev, &mut tel.axes[a], &control.axes[a]);
                machine.handle_index_search(&mut self.dev, &mut tel.axes[a], &control.axes[a]);
                machine.handle_calibration(&mut self.dev, &mut tel.axes[a], &control.axes[a]);
                machine.apply(&mut self.dev, &mut tel.axes[a], &control.axes[a], tel.delta_time);
                self.read_diagnostics(tel, a);
            } else {
                self.axes[a].force_idle(&mut self.dev, &mut tel.axes[a]);
            }
        }

        self.check()?;

        if self.save_config.observe(control.save_config_trigger) {
            info!("saving device configuration to flash");
            self.dev.call("save_configuration");
        }
        if self.reboot.observe(control.reboot_trigger) {
            info!("rebooting device");
            self.dev.call("reboot");
        }

        tel.delta_time_device_us = started.elapsed().as_micros() as u32;
        Ok(())
    }

    /// Slow diagnostics are spread over ticks; one endpoint per tick.
    fn read_diagnostics(&mut self, tel: &mut TelemetryRecord, a: usize) {
        let name = AXIS_NAMES[a];
        match tel.tick % 6 {
            0 => tel.bus_voltage = self.dev.get("vbus_voltage"),
            1 => tel.bus_current = self.dev.get("ibus"),
            2 => {
                if self.fw_has_extensions {
                    tel.axes[a].encoder_index_error = self
                        .dev
                        .get(&format!("{name}.encoder.index_check_cumulative_error"));
                }
            }
            3 => {
                if self.fw_has_extensions {
                    tel.axes[a].encoder_index_count =
                        self.dev.get(&format!("{name}.encoder.index_check_index_count"));
                }
            }
            4 => {
                tel.axes[a].encoder_shadow_count =
                    self.dev.get(&format!("{name}.encoder.shadow_count"));
            }
            _ => {
                tel.axes[a].anticogging_valid = self
                    .dev
                    .get::<bool>(&format!("{name}.controller.anticogging_valid"))
                    as u8;
            }
        }
    }

    /// Feed the watchdog and escalate device faults.
    fn check(&mut self) -> Result<(), ProxyError> {
        if !self.dev.healthy() {
            return Err(ProxyError::Communication);
        }
        if feed_and_check_errors(&mut self.dev, self.fw_has_extensions) {
            let faults = scan_faults(&mut self.dev);
            for fault in &faults {
                error!(%fault, "device fault");
            }
            if !faults.is_empty() {
                return Err(ProxyError::DeviceFault {
                    count: faults.len(),
                });
            }
        }
        if !self.dev.healthy() {
            return Err(ProxyError::Communication);
        }
        Ok(())
    }

    /// Safe shutdown: every axis idle, watchdog disarmed.
    ///
    /// This runs on every exit path, including fatal errors, so motors
    /// are never left powered without active supervision.
    pub fn close(&mut self, tel: &mut TelemetryRecord) {
        for (a, name) in AXIS_NAMES.iter().enumerate() {
            self.dev.set(&format!("{name}.requested_state"), AXIS_STATE_IDLE);
            self.dev.set(&format!("{name}.config.enable_watchdog"), false);
            tel.axes[a].is_running = 0;
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
