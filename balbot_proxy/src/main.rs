//! # Balancing Robot Proxy
//!
//! Bridges the motor-controller device (USB or UART) and the remote
//! monitoring client over TCP. Runs the fixed-cadence control loop that
//! synchronizes the control record with the device and streams telemetry
//! back to the client.
//!
//! # Usage
//!
//! ```bash
//! # Connect over USB with defaults
//! balbot_proxy --usb
//!
//! # Connect over UART, custom listen port, verbose logs
//! balbot_proxy --uart /dev/ttyAMA1 -b 921600 -p 9401 -v
//!
//! # Keep pre-existing device faults visible
//! balbot_proxy --usb --no-clear
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use balbot_common::config::ProxyConfig;
use balbot_common::consts::{DEFAULT_BAUD_RATE, DEFAULT_STOP_BITS};
use balbot_proxy::device::{DeviceController, DeviceOptions};
use balbot_proxy::sched::{self, ProxyContext};
use balbot_proxy::server::Server;
use balbot_proxy::transport::SerialTransport;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Balancing robot proxy - motor controller monitor and network bridge
#[derive(Parser, Debug)]
#[command(name = "balbot_proxy")]
#[command(version)]
#[command(about = "Connects to the motor controller (USB or UART) and serves telemetry to a monitoring client")]
#[command(long_about = None)]
struct Args {
    /// Connect to the motor controller via USB
    #[arg(long, conflicts_with = "uart", required_unless_present = "uart")]
    usb: bool,

    /// Connect to the motor controller via UART at the given device path
    #[arg(long, value_name = "ADDRESS")]
    uart: Option<String>,

    /// UART baudrate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baudrate: u32,

    /// Number of UART stop bits (1 or 2)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=2), default_value_t = DEFAULT_STOP_BITS)]
    stop_bits: u8,

    /// TCP port to listen on for monitoring clients (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Wait for input after exit, so error messages stay visible
    #[arg(short, long)]
    wait_input: bool,

    /// Do not clear pre-existing device faults on startup (also `--nc`)
    #[arg(long, alias = "nc")]
    no_clear: bool,

    /// Path to the proxy configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    let code = match run(&args) {
        Ok(()) => 0,
        Err(e) => {
            error!("proxy failed: {e}");
            1
        }
    };

    if args.wait_input {
        println!("Press Enter to exit");
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
    }
    std::process::exit(code);
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    info!("balbot_proxy v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => ProxyConfig::load(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    let transport = match &args.uart {
        Some(address) => {
            info!(address, baudrate = args.baudrate, stop_bits = args.stop_bits, "connecting via UART");
            SerialTransport::open_uart(address, args.baudrate, args.stop_bits)?
        }
        None => {
            info!("connecting via USB");
            SerialTransport::open_usb()?
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    let opts = DeviceOptions {
        clear_errors_on_startup: !args.no_clear,
        watchdog_timeout_s: config.watchdog_timeout_s,
        scope_start_poll_limit: config.scope_start_poll_limit,
    };

    let mut ctx = ProxyContext::new(&config);
    let mut controller =
        DeviceController::init(transport, &mut ctx.telemetry, &mut ctx.control, &opts)?;
    let mut server = Server::bind(config.port)?;

    let result = sched::run_loop(&mut controller, &mut server, &mut ctx, &shutdown);

    // Ordered teardown on every exit path: drop the client first, then
    // idle the axes and disarm the watchdog.
    server.close(&mut ctx.control);
    controller.close(&mut ctx.telemetry);

    result?;
    info!("balbot_proxy shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
