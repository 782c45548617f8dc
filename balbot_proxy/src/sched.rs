//! The fixed-cadence proxy loop.
//!
//! One iteration is: device update, network update, then sleep whatever
//! remains of the target interval. A late tick just runs the next
//! iteration immediately; there is no catch-up. The phase timings land
//! in telemetry for diagnosis only and never influence scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use balbot_common::config::ProxyConfig;
use balbot_common::consts::DEFAULT_TICK_MS;
use balbot_common::records::{ControlRecord, TelemetryRecord};

use crate::device::DeviceController;
use crate::error::ProxyError;
use crate::server::Server;
use crate::transport::EndpointTransport;

/// The two live records everything in the proxy works against.
pub struct ProxyContext {
    pub telemetry: TelemetryRecord,
    pub control: ControlRecord,
}

impl ProxyContext {
    pub fn new(config: &ProxyConfig) -> Self {
        let mut telemetry = TelemetryRecord::default();
        telemetry.delta_time = config.target_tick_ms * 1e-3;
        let mut control = ControlRecord::default();
        control.target_tick_ms = config.target_tick_ms;
        control.stop_motors_on_disconnect = config.stop_motors_on_disconnect as u8;
        Self { telemetry, control }
    }
}

/// Tick interval requested by the client, with a sane fallback so a
/// zeroed record cannot spin the loop hot.
fn target_interval(control: &ControlRecord) -> Duration {
    let ms = if control.target_tick_ms > 0.0 {
        control.target_tick_ms
    } else {
        DEFAULT_TICK_MS
    };
    Duration::from_secs_f64(f64::from(ms) * 1e-3)
}

/// Run until the shutdown flag is raised or a fatal error occurs.
pub fn run_loop<T: EndpointTransport>(
    controller: &mut DeviceController<T>,
    server: &mut Server,
    ctx: &mut ProxyContext,
    shutdown: &AtomicBool,
) -> Result<(), ProxyError> {
    let epoch = Instant::now();
    let mut last = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        controller.update(&mut ctx.telemetry, &mut ctx.control)?;
        server.update(&mut ctx.telemetry, &mut ctx.control);

        let before_sleep = Instant::now();
        if let Some(remaining) = target_interval(&ctx.control).checked_sub(before_sleep - last) {
            thread::sleep(remaining);
        }

        let now = Instant::now();
        ctx.telemetry.delta_time_sleep_us = (now - before_sleep).as_micros() as u32;
        ctx.telemetry.delta_time = (now - last).as_secs_f32();
        last = now;
        ctx.telemetry.uptime_micros = epoch.elapsed().as_micros() as u64;
        ctx.telemetry.local_time = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_secs() as i64,
            Err(_) => 0,
        };
        ctx.telemetry.tick = ctx.telemetry.tick.wrapping_add(1);
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
