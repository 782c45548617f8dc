//! Typed access to device endpoints.
//!
//! [`Device`] wraps a transport with typed `get`/`set`/`call` on dot-path
//! endpoints. Per the contract of the device link, individual operations
//! do not surface errors to their call sites: the first failure latches a
//! persistent communication-error flag (and a failed `get` yields the
//! type's default). The control loop checks the flag once per tick and
//! treats a tripped link as fatal; a broken serial/USB link is not safely
//! auto-recoverable mid-loop.

use tracing::{debug, warn};

use crate::transport::{EndpointTransport, TransportError};

/// Values that cross the endpoint link as text.
pub trait EndpointValue: Sized + Default {
    fn parse_text(text: &str) -> Option<Self>;
    fn format_text(&self) -> String;
}

macro_rules! numeric_endpoint_value {
    ($($ty:ty),*) => {$(
        impl EndpointValue for $ty {
            fn parse_text(text: &str) -> Option<Self> {
                text.trim().parse().ok()
            }
            fn format_text(&self) -> String {
                self.to_string()
            }
        }
    )*};
}

numeric_endpoint_value!(i32, u32, i64, u64, f32);

impl EndpointValue for bool {
    fn parse_text(text: &str) -> Option<Self> {
        match text.trim() {
            "0" | "false" => Some(false),
            "1" | "true" => Some(true),
            _ => None,
        }
    }
    fn format_text(&self) -> String {
        if *self { "1" } else { "0" }.to_string()
    }
}

/// The device endpoint client.
pub struct Device<T: EndpointTransport> {
    transport: T,
    communication_error: bool,
}

impl<T: EndpointTransport> Device<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            communication_error: false,
        }
    }

    /// False once any endpoint operation has failed.
    #[inline]
    pub fn healthy(&self) -> bool {
        !self.communication_error
    }

    /// Typed read; returns the default value on any failure.
    pub fn get<V: EndpointValue>(&mut self, path: &str) -> V {
        match self.transport.read_value(path) {
            Ok(text) => match V::parse_text(&text) {
                Some(value) => value,
                None => {
                    self.fail(path, &TransportError::Rejected {
                        path: path.to_string(),
                        reply: text,
                    });
                    V::default()
                }
            },
            Err(e) => {
                self.fail(path, &e);
                V::default()
            }
        }
    }

    /// Typed write.
    pub fn set<V: EndpointValue>(&mut self, path: &str, value: V) {
        if let Err(e) = self.transport.write_value(path, &value.format_text()) {
            self.fail(path, &e);
        }
    }

    /// Invoke a void function endpoint.
    pub fn call(&mut self, path: &str) {
        if let Err(e) = self.transport.call(path, None) {
            self.fail(path, &e);
        }
    }

    /// Invoke a function endpoint with one argument and a typed result.
    pub fn call_with<A: EndpointValue, V: EndpointValue>(&mut self, path: &str, arg: A) -> V {
        match self.transport.call(path, Some(&arg.format_text())) {
            Ok(text) => V::parse_text(&text).unwrap_or_default(),
            Err(e) => {
                self.fail(path, &e);
                V::default()
            }
        }
    }

    fn fail(&mut self, path: &str, error: &TransportError) {
        if !self.communication_error {
            warn!(path, %error, "device endpoint failure, link marked dead");
        } else {
            debug!(path, %error, "device endpoint failure");
        }
        self.communication_error = true;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn typed_get_and_set() {
        let (transport, state) = MockTransport::new();
        let mut dev = Device::new(transport);

        state.borrow_mut().set("vbus_voltage", "23.75");
        state.borrow_mut().set("axis0.error", "2048");

        assert_eq!(dev.get::<f32>("vbus_voltage"), 23.75);
        assert_eq!(dev.get::<i32>("axis0.error"), 2048);

        dev.set("axis0.requested_state", 8i32);
        assert_eq!(state.borrow().last_write("axis0.requested_state"), Some("8"));
        assert!(dev.healthy());
    }

    #[test]
    fn bool_formats_as_digit() {
        let (transport, state) = MockTransport::new();
        let mut dev = Device::new(transport);

        dev.set("axis0.config.enable_watchdog", true);
        assert_eq!(
            state.borrow().last_write("axis0.config.enable_watchdog"),
            Some("1")
        );
        state.borrow_mut().set("axis0.motor.is_calibrated", "true");
        assert!(dev.get::<bool>("axis0.motor.is_calibrated"));
    }

    #[test]
    fn failure_latches_flag_and_returns_default() {
        let (transport, state) = MockTransport::new();
        let mut dev = Device::new(transport);

        state.borrow_mut().fail_all = true;
        assert_eq!(dev.get::<f32>("vbus_voltage"), 0.0);
        assert!(!dev.healthy());

        // Flag stays latched even after the link "recovers".
        state.borrow_mut().fail_all = false;
        assert_eq!(dev.get::<f32>("vbus_voltage"), 0.0);
        assert!(!dev.healthy());
    }

    #[test]
    fn unparsable_reply_latches_flag() {
        let (transport, state) = MockTransport::new();
        let mut dev = Device::new(transport);

        state.borrow_mut().set("serial_number", "garbage");
        assert_eq!(dev.get::<u64>("serial_number"), 0);
        assert!(!dev.healthy());
    }
}
