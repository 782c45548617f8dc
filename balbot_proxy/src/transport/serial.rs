//! ASCII line transport over a serial port.
//!
//! Request/reply, one line each way, LF terminated:
//!
//! ```text
//! r <path>            ->  <value>
//! w <path> <value>    ->  ok
//! c <path> [<arg>]    ->  <value> | ok
//! ```
//!
//! Error replies start with `err`. The same protocol runs over a UART
//! link or the controller's USB-CDC port; `--usb` autodiscovers the port
//! by USB vendor/product id.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType, StopBits};
use tracing::{debug, info};

use super::{EndpointTransport, TransportError};

/// USB vendor/product id the controller enumerates with.
const DEVICE_USB_VID: u16 = 0x1209;
const DEVICE_USB_PID: u16 = 0x0D32;

/// Per-request reply timeout.
const LINK_TIMEOUT: Duration = Duration::from_millis(500);

/// Serial transport speaking the ASCII line protocol.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    line: Vec<u8>,
}

impl SerialTransport {
    /// Open a UART link at an explicit device path.
    pub fn open_uart(address: &str, baud_rate: u32, stop_bits: u8) -> Result<Self, TransportError> {
        let stop = if stop_bits == 1 {
            StopBits::One
        } else {
            StopBits::Two
        };
        let port = serialport::new(address, baud_rate)
            .stop_bits(stop)
            .timeout(LINK_TIMEOUT)
            .open()?;
        info!(address, baud_rate, stop_bits, "opened UART link");
        Ok(Self {
            port,
            line: Vec::with_capacity(64),
        })
    }

    /// Autodiscover the controller's USB-CDC port and open it.
    pub fn open_usb() -> Result<Self, TransportError> {
        for info in serialport::available_ports()? {
            if let SerialPortType::UsbPort(ref usb) = info.port_type {
                if usb.vid == DEVICE_USB_VID && usb.pid == DEVICE_USB_PID {
                    let port = serialport::new(&info.port_name, 115_200)
                        .timeout(LINK_TIMEOUT)
                        .open()?;
                    info!(port = %info.port_name, "opened USB link");
                    return Ok(Self {
                        port,
                        line: Vec::with_capacity(64),
                    });
                }
            }
        }
        Err(TransportError::DeviceNotFound)
    }

    /// Send one request line and read one reply line.
    fn exchange(&mut self, path: &str, request: &str) -> Result<String, TransportError> {
        debug!(request, "serial request");
        self.port.write_all(request.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;

        self.line.clear();
        loop {
            let mut byte = [0u8; 1];
            match self.port.read(&mut byte) {
                Ok(0) => {
                    return Err(TransportError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "serial link closed",
                    )))
                }
                Ok(_) => match byte[0] {
                    b'\n' => break,
                    b'\r' => {}
                    b => self.line.push(b),
                },
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout {
                        path: path.to_string(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        let reply = String::from_utf8_lossy(&self.line).into_owned();
        if reply.starts_with("err") {
            return Err(TransportError::Rejected {
                path: path.to_string(),
                reply,
            });
        }
        Ok(reply)
    }
}

impl EndpointTransport for SerialTransport {
    fn read_value(&mut self, path: &str) -> Result<String, TransportError> {
        self.exchange(path, &format!("r {path}"))
    }

    fn write_value(&mut self, path: &str, value: &str) -> Result<(), TransportError> {
        self.exchange(path, &format!("w {path} {value}"))?;
        Ok(())
    }

    fn call(&mut self, path: &str, arg: Option<&str>) -> Result<String, TransportError> {
        let request = match arg {
            Some(arg) => format!("c {path} {arg}"),
            None => format!("c {path}"),
        };
        let reply = self.exchange(path, &request)?;
        Ok(if reply == "ok" { String::new() } else { reply })
    }
}
