//! Reconnecting TCP and Unix-domain network client.
//!
//! `redial` keeps a connection to one remote alive: it dials, runs your session
//! over the connection and, when the connection drops, classifies the error,
//! backs off and dials again until the error is fatal or you shut it down.
//!
//! # Crates
//!
//! - [`core`]: sentinel errors, the error classifier, backoff interval
//!   functions and the event system
//! - [`client`]: address resolution, the connector, waiters, the task group
//!   and the [`Client`] itself
//! - `stream` (`stream` feature): framed, typed message sessions
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! redial = { version = "0.1", features = ["stream", "tracing"] }
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use redial::{Client, Config, RedialError};
//! use redial::core::ExponentialBackoff;
//! use redial::client::BackoffWaiter;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder("db.internal:5432")
//!     .name("db")
//!     .waiter(
//!         BackoffWaiter::new(ExponentialBackoff::new(Duration::from_millis(100)))
//!             .max_attempts(20),
//!     )
//!     .on_session(|client: Client| async move {
//!         client.write(b"PING\r\n").await?;
//!         client.flush().await?;
//!         client.cancelled().await;
//!         Ok::<(), redial::BoxError>(())
//!     })
//!     .on_reconnect(|attempt| eprintln!("reconnect attempt {attempt}"))
//!     .build();
//!
//! let client = Client::new(Arc::new(config))?;
//! client.connect()?;
//!
//! tokio::signal::ctrl_c().await?;
//! match client.shutdown(Duration::from_secs(5)).await {
//!     Err(RedialError::ShutdownTimedOut) => eprintln!("session did not stop in time"),
//!     other => other?,
//! }
//! # Ok(())
//! # }
//! ```

// Re-export core and client (always available)
pub use redial_client as client;
pub use redial_core as core;

#[cfg(feature = "stream")]
pub use redial_stream as stream;

pub use redial_client::{
    resolve, Client, ClientEvent, Config, ConfigBuilder, ConnectionState, Network, ResolvedAddr,
    TaskGroup,
};
pub use redial_core::{BoxError, RedialError, SharedError};

#[cfg(feature = "stream")]
pub use redial_stream::{StreamError, StreamSession};
