//! Proxy process configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an
//! empty file (or no file at all) yields a working configuration. CLI
//! switches override individual fields after loading.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    DEFAULT_PORT, DEFAULT_SCOPE_POLL_LIMIT, DEFAULT_TICK_MS, DEFAULT_WATCHDOG_TIMEOUT_S,
};

/// Configuration load/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Proxy configuration, immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// TCP listen port for monitoring clients.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Initial control-loop cadence [ms]; the client may change it at
    /// runtime through the control record.
    #[serde(default = "default_tick_ms")]
    pub target_tick_ms: f32,

    /// Device watchdog timeout armed at startup [s].
    #[serde(default = "default_watchdog_timeout")]
    pub watchdog_timeout_s: f32,

    /// Initial value of the disconnect policy flag in the control record.
    #[serde(default = "default_true")]
    pub stop_motors_on_disconnect: bool,

    /// How many times to poll for the oscilloscope start sentinel before
    /// abandoning a trigger.
    #[serde(default = "default_scope_poll_limit")]
    pub scope_start_poll_limit: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_tick_ms() -> f32 {
    DEFAULT_TICK_MS
}
fn default_watchdog_timeout() -> f32 {
    DEFAULT_WATCHDOG_TIMEOUT_S
}
fn default_true() -> bool {
    true
}
fn default_scope_poll_limit() -> u32 {
    DEFAULT_SCOPE_POLL_LIMIT
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            target_tick_ms: default_tick_ms(),
            watchdog_timeout_s: default_watchdog_timeout(),
            stop_motors_on_disconnect: true,
            scope_start_poll_limit: default_scope_poll_limit(),
        }
    }
}

impl ProxyConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Bounds checks on numeric fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.5..=100.0).contains(&self.target_tick_ms) {
            return Err(ConfigError::Invalid {
                field: "target_tick_ms",
                reason: format!("{} outside 0.5..=100.0", self.target_tick_ms),
            });
        }
        if !(0.1..=10.0).contains(&self.watchdog_timeout_s) {
            return Err(ConfigError::Invalid {
                field: "watchdog_timeout_s",
                reason: format!("{} outside 0.1..=10.0", self.watchdog_timeout_s),
            });
        }
        if self.scope_start_poll_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "scope_start_poll_limit",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.target_tick_ms, DEFAULT_TICK_MS);
        assert!(config.stop_motors_on_disconnect);
        assert_eq!(config.scope_start_poll_limit, DEFAULT_SCOPE_POLL_LIMIT);
    }

    #[test]
    fn partial_file_overrides_some_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 7777\ntarget_tick_ms = 2.0").unwrap();
        let config = ProxyConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 7777);
        assert_eq!(config.target_tick_ms, 2.0);
        assert_eq!(config.watchdog_timeout_s, DEFAULT_WATCHDOG_TIMEOUT_S);
    }

    #[test]
    fn out_of_bounds_cadence_rejected() {
        let config: ProxyConfig = toml::from_str("target_tick_ms = 0.01").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "target_tick_ms",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ProxyConfig::load(Path::new("/nonexistent/balbot.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
