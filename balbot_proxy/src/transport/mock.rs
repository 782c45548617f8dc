//! Scriptable in-memory device for tests.
//!
//! Backs the endpoint tree with a property map. Tests hold a handle to the
//! shared [`MockState`] and script device behavior between ticks: seed
//! property values, flip fault registers, inspect the write and call logs,
//! or fail the link outright to exercise the communication-error path.
//!
//! The oscilloscope bulk-retrieval endpoint is emulated for real: a call
//! to `get_oscilloscope_val_4` packs four consecutive samples from
//! [`MockState::scope_samples`] as binary16 into one 64-bit word, exactly
//! like the firmware.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::rc::Rc;

use balbot_common::half::f32_to_half;

use super::{EndpointTransport, TransportError};

/// Shared mock device state.
#[derive(Debug, Default)]
pub struct MockState {
    /// Property tree; endpoints absent from the map read as "0".
    pub values: HashMap<String, String>,
    /// Every write, in order.
    pub writes: Vec<(String, String)>,
    /// Every call, in order.
    pub calls: Vec<(String, Option<String>)>,
    /// Every read path, in order.
    pub reads: Vec<String>,
    /// When set, every operation fails with a broken-pipe I/O error.
    pub fail_all: bool,
    /// Sample buffer served by `get_oscilloscope_val_4`.
    pub scope_samples: Vec<f32>,
}

impl MockState {
    /// Seed a property value.
    pub fn set(&mut self, path: &str, value: impl ToString) {
        self.values.insert(path.to_string(), value.to_string());
    }

    /// Number of writes made to `path`.
    pub fn writes_to(&self, path: &str) -> usize {
        self.writes.iter().filter(|(p, _)| p == path).count()
    }

    /// Number of calls made to `path`.
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.iter().filter(|(p, _)| p == path).count()
    }

    /// Last value written to `path`, if any.
    pub fn last_write(&self, path: &str) -> Option<&str> {
        self.writes
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport handle over shared [`MockState`].
#[derive(Clone)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    /// Create a mock transport plus the state handle tests script through.
    pub fn new() -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }

    fn link_down() -> TransportError {
        TransportError::Io(std::io::Error::new(
            ErrorKind::BrokenPipe,
            "mock link down",
        ))
    }
}

impl EndpointTransport for MockTransport {
    fn read_value(&mut self, path: &str) -> Result<String, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.fail_all {
            return Err(Self::link_down());
        }
        state.reads.push(path.to_string());
        Ok(state.values.get(path).cloned().unwrap_or_else(|| "0".to_string()))
    }

    fn write_value(&mut self, path: &str, value: &str) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.fail_all {
            return Err(Self::link_down());
        }
        state.writes.push((path.to_string(), value.to_string()));
        state.values.insert(path.to_string(), value.to_string());
        Ok(())
    }

    fn call(&mut self, path: &str, arg: Option<&str>) -> Result<String, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.fail_all {
            return Err(Self::link_down());
        }
        state.calls.push((path.to_string(), arg.map(str::to_string)));

        if path == "get_oscilloscope_val_4" {
            let index: usize = arg.and_then(|a| a.parse().ok()).unwrap_or(0);
            let mut packed = 0u64;
            for i in 0..4 {
                let sample = state.scope_samples.get(index + i).copied().unwrap_or(0.0);
                packed |= u64::from(f32_to_half(sample)) << (i * 16);
            }
            return Ok(packed.to_string());
        }

        Ok(state.values.get(path).cloned().unwrap_or_default())
    }
}
