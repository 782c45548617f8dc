//! Oscilloscope capture state machine.
//!
//! The device records a large high-rate sample buffer on its own; the
//! proxy only triggers the capture and drains the result in bounded
//! chunks so retrieval never starves the control loop. Progress is
//! published through the telemetry scope window `[start, end)`.

use balbot_common::consts::{SCOPE_CHUNK, SCOPE_DONE_BIT, SCOPE_STARTED_BIT};
use balbot_common::half::half_to_f32;
use balbot_common::records::{ControlRecord, ScopeState, TelemetryRecord};
use balbot_common::trigger::EdgeTrigger;
use tracing::{info, warn};

use crate::endpoint::Device;
use crate::transport::EndpointTransport;

const TRIGGER_PATH: &str = "axis0.motor.oscilloscope_force_trigger";
const COUNTER_PATH: &str = "axis0.motor.oscilloscope_counter";
const SIZE_PATH: &str = "oscilloscope_size";
const FETCH_PATH: &str = "get_oscilloscope_val_4";

/// Driver for one capture session at a time.
#[derive(Debug)]
pub struct ScopeCapture {
    trigger: EdgeTrigger,
    total_samples: i32,
    start_poll_limit: u32,
}

impl ScopeCapture {
    pub fn new(start_poll_limit: u32) -> Self {
        Self {
            trigger: EdgeTrigger::new(),
            total_samples: 0,
            start_poll_limit,
        }
    }

    /// Adopt the current trigger counter without firing (startup).
    pub fn sync_trigger(&mut self, control: &ControlRecord) {
        self.trigger.sync(control.scope_trigger);
    }

    /// Advance the state machine by one tick.
    pub fn update<T: EndpointTransport>(
        &mut self,
        dev: &mut Device<T>,
        tel: &mut TelemetryRecord,
        control: &ControlRecord,
        fw_has_extensions: bool,
    ) {
        // The edge is consumed even when preconditions reject it, so a
        // stale request cannot fire later out of context.
        let fired = self.trigger.observe(control.scope_trigger);

        match ScopeState::from_raw(tel.scope_state) {
            ScopeState::Idle => {
                let axes_running = tel.axes.iter().all(|a| a.is_running != 0);
                if fired && fw_has_extensions && axes_running {
                    self.start_capture(dev, tel);
                }
            }
            ScopeState::Recording => {
                let counter: i64 = dev.get(COUNTER_PATH);
                if counter & SCOPE_DONE_BIT != 0 {
                    tel.device_counter = counter as i32;
                    tel.scope_end = tel.device_counter;
                    tel.scope_state = ScopeState::RecordingDone as u32;
                    dev.set(COUNTER_PATH, 0i64);
                }
            }
            ScopeState::RecordingDone => {
                self.total_samples = dev.get(SIZE_PATH);
                info!(samples = self.total_samples, "oscilloscope capture complete");
                tel.scope_start = 0;
                tel.scope_end = 0;
                tel.scope_state = ScopeState::Transmitting as u32;
                // Fall straight into transmission so the first chunk goes
                // out in the same tick the size was learned.
                self.transmit_chunk(dev, tel);
            }
            ScopeState::Transmitting => {
                self.transmit_chunk(dev, tel);
            }
        }
    }

    fn start_capture<T: EndpointTransport>(&mut self, dev: &mut Device<T>, tel: &mut TelemetryRecord) {
        dev.set(TRIGGER_PATH, true);

        // The device arms asynchronously; wait (bounded) until the
        // capture counter leaves zero before inspecting the sentinel.
        let mut counter: i64 = 0;
        let mut polls = 0u32;
        while counter == 0 && polls < self.start_poll_limit {
            counter = dev.get(COUNTER_PATH);
            polls += 1;
        }

        if counter & SCOPE_STARTED_BIT == 0 {
            warn!(polls, "oscilloscope did not start, canceling request");
            dev.set(TRIGGER_PATH, false);
            return;
        }

        info!("oscilloscope recording started");
        tel.device_counter = counter as i32;
        tel.scope_start = tel.device_counter;
        tel.scope_end = tel.device_counter;
        tel.scope_state = ScopeState::Recording as u32;
    }

    /// Pull up to `SCOPE_CHUNK` samples, four packed half floats per
    /// round trip, and publish them through the telemetry window.
    fn transmit_chunk<T: EndpointTransport>(&mut self, dev: &mut Device<T>, tel: &mut TelemetryRecord) {
        tel.scope_start = tel.scope_end;
        while tel.scope_end < self.total_samples
            && ((tel.scope_end - tel.scope_start) as usize) < SCOPE_CHUNK
        {
            let packed: u64 = dev.call_with(FETCH_PATH, tel.scope_end);
            let mut i = 0;
            while tel.scope_end < self.total_samples
                && ((tel.scope_end - tel.scope_start) as usize) < SCOPE_CHUNK
                && i < 4
            {
                let half = (packed >> (i * 16)) as u16;
                tel.scope_samples[(tel.scope_end - tel.scope_start) as usize] = half_to_f32(half);
                tel.scope_end += 1;
                i += 1;
            }
        }
        if tel.scope_start == tel.scope_end {
            tel.scope_state = ScopeState::Idle as u32;
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
