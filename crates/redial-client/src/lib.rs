//! Reconnecting TCP and Unix-domain client.
//!
//! A [`Client`] dials one remote, runs a caller-supplied session over the
//! connection and, when the connection drops or the dial fails, classifies the
//! error, waits according to a pluggable [`Waiter`] and dials again. It stops
//! when an error is fatal, a callback asks it to, or the caller shuts it down.
//!
//! # Features
//!
//! - **Address forms**: `host:port`, `[v6]:port`, `unix:/path`, `/path`,
//!   `name.sock` and `@abstract` names
//! - **Lifecycle callbacks**: `on_connect` handshake, `on_session`,
//!   `on_disconnect` and an `on_error` override of classification
//! - **Backoff**: any [`IntervalFunction`](redial_core::IntervalFunction)
//!   through [`BackoffWaiter`], or a custom [`Waiter`]
//! - **Supervised tasks**: a [`TaskGroup`] converting panics into errors and
//!   shutting down with a deadline
//! - **Event system**: state transitions, dials, connects and terminations
//!
//! # Example
//!
//! ```no_run
//! use redial_client::{Client, Config};
//! use redial_core::{BoxError, RedialError};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder("/run/collector.sock")
//!     .name("collector")
//!     .reconnect_delay(Duration::from_millis(500))
//!     .on_session(|client: Client| async move {
//!         client.write(b"PING\n").await?;
//!         client.flush().await?;
//!         let mut buf = [0u8; 5];
//!         client.read(&mut buf).await?;
//!         if &buf != b"PONG\n" {
//!             // Wrong peer: stop without reporting a failure.
//!             return Err(RedialError::DoNotReconnect.boxed());
//!         }
//!         client.cancelled().await;
//!         Ok::<(), BoxError>(())
//!     })
//!     .on_state_change(|from, to| println!("{from:?} -> {to:?}"))
//!     .build();
//!
//! let client = Client::new(Arc::new(config))?;
//! client.connect()?;
//! client.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `tracing`: structured logs for dials, connects, disconnects and termination
//! - `metrics`: `redial_*` counters, the `redial_connected` gauge and the
//!   session duration histogram
//! - `serde`: [`Settings`], a deserializable form of the configuration

pub mod address;
mod client;
mod config;
mod conn;
pub mod connector;
mod events;
mod group;
#[cfg(feature = "serde")]
mod settings;
mod state;
pub mod waiter;

pub use address::{resolve, Network, ResolvedAddr};
pub use client::Client;
pub use config::{Config, ConfigBuilder, DEFAULT_RECONNECT_DELAY, DEFAULT_TIMEOUT};
pub use conn::{ConnInfo, Stream};
pub use connector::{BoxConnector, Connector, SocketHook};
pub use events::ClientEvent;
pub use group::TaskGroup;
#[cfg(feature = "serde")]
pub use settings::Settings;
pub use state::{ClientState, ConnectionState};
pub use waiter::{BackoffWaiter, DelayWaiter, FnWaiter, Waiter};

pub use redial_core::{BoxError, RedialError, SharedError, UnknownErrorPolicy};

#[cfg(feature = "metrics")]
static METRICS_INIT: std::sync::Once = std::sync::Once::new();

#[cfg(feature = "metrics")]
pub(crate) fn describe_metrics() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    METRICS_INIT.call_once(|| {
        describe_counter!(
            "redial_dial_attempts_total",
            "Total number of dial attempts"
        );
        describe_counter!(
            "redial_dial_failures_total",
            "Total number of failed dial attempts"
        );
        describe_counter!(
            "redial_connections_total",
            "Total number of established connections"
        );
        describe_counter!(
            "redial_disconnects_total",
            "Total number of connections that ended"
        );
        describe_counter!(
            "redial_terminations_total",
            "Total number of clients that stopped reconnecting"
        );
        describe_gauge!(
            "redial_connected",
            "Whether the client currently holds a connection (1) or not (0)"
        );
        describe_histogram!(
            "redial_session_duration_seconds",
            "Lifetime of a connection from accept to disconnect"
        );
    });
}
