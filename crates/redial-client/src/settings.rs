//! Deserializable client settings.
//!
//! [`Settings`] is the plain-data half of a [`Config`]: everything except the
//! callbacks. Missing fields take the builder defaults and durations are given
//! in milliseconds.
//!
//! ```
//! use redial_client::Settings;
//!
//! let settings: Settings = serde_json::from_str(r#"{
//!     "name": "metrics-sink",
//!     "remote": "/run/sink.sock",
//!     "dial_timeout_ms": 500
//! }"#).unwrap();
//!
//! let config = settings.into_builder().build();
//! assert_eq!(config.name(), "metrics-sink");
//! assert_eq!(config.dial_timeout().as_millis(), 500);
//! ```

use crate::config::{ConfigBuilder, DEFAULT_RECONNECT_DELAY, DEFAULT_TIMEOUT};
use crate::Config;
use redial_core::classify::UnknownErrorPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client settings loadable from any serde format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Client name for events, logs and metrics.
    pub name: Option<String>,
    /// Remote address, see [`crate::address`].
    pub remote: String,
    /// TCP keep-alive period.
    pub keep_alive_ms: u64,
    /// Dial timeout.
    pub dial_timeout_ms: u64,
    /// Read timeout exposed to sessions.
    pub read_timeout_ms: u64,
    /// Bound on writes and flushes without an explicit deadline.
    pub write_timeout_ms: u64,
    /// Pause between attempts.
    pub reconnect_delay_ms: u64,
    /// Keep reconnecting on errors the classifier does not recognise.
    pub retry_unknown_errors: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: None,
            remote: String::new(),
            keep_alive_ms: millis(DEFAULT_TIMEOUT),
            dial_timeout_ms: millis(DEFAULT_TIMEOUT),
            read_timeout_ms: millis(DEFAULT_TIMEOUT),
            write_timeout_ms: millis(DEFAULT_TIMEOUT),
            reconnect_delay_ms: millis(DEFAULT_RECONNECT_DELAY),
            retry_unknown_errors: false,
        }
    }
}

impl Settings {
    /// Converts the settings into a builder, ready for callbacks.
    pub fn into_builder(self) -> ConfigBuilder {
        let builder = Config::builder(self.remote)
            .keep_alive(Duration::from_millis(self.keep_alive_ms))
            .dial_timeout(Duration::from_millis(self.dial_timeout_ms))
            .read_timeout(Duration::from_millis(self.read_timeout_ms))
            .write_timeout(Duration::from_millis(self.write_timeout_ms))
            .reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .unknown_errors(if self.retry_unknown_errors {
                UnknownErrorPolicy::Retry
            } else {
                UnknownErrorPolicy::Fatal
            });
        match self.name {
            Some(name) => builder.name(name),
            None => builder,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
