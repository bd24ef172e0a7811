//! Framed, typed message sessions over a redial connection.
//!
//! A [`StreamSession`] runs inside a client's `on_session` callback. It splits
//! the connection into frames, unmarshals incoming frames into messages and
//! marshals outgoing messages, using one reader task and one writer task in
//! the client's [`TaskGroup`](redial_client::TaskGroup).
//!
//! # Features
//!
//! - **Framing**: newline-delimited [`LineFraming`] by default, or any
//!   tokio-util codec such as [`LengthDelimitedCodec`]
//! - **Marshalling**: plain functions, a buffer-reusing `marshal_into`, or
//!   JSON through [`StreamSessionBuilder::json`]
//! - **Deadline hooks**: run around every read and write, with
//!   `read_timeout`/`write_timeout` shortcuts
//! - **Transports**: the [`Client`](redial_client::Client) itself, or any
//!   tokio I/O object through [`IoTransport`]
//!
//! # Example
//!
//! ```no_run
//! use redial_client::{Client, Config};
//! use redial_core::BoxError;
//! use redial_stream::StreamSession;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Reading {
//!     sensor: String,
//!     value: f64,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder("/run/telemetry.sock")
//!     .on_session(|client: Client| async move {
//!         let session = StreamSession::<Reading, Reading>::builder()
//!             .transport(client.clone())
//!             .json()
//!             .read_timeout(Duration::from_secs(30))
//!             .spawn(client.tasks())?;
//!
//!         while let Some(reading) = session.recv().await {
//!             session.send(reading).await?;
//!         }
//!         match session.err() {
//!             Some(err) => Err(err.into()),
//!             None => Ok::<(), BoxError>(()),
//!         }
//!     })
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
//! - `json` (default): [`StreamSessionBuilder::json`]
//! - `tracing`: reader and writer lifecycle logs
//! - `metrics`: `redial_stream_messages_total{direction}`

mod error;
pub mod framing;
mod session;
pub mod transport;

pub use error::{Result, StreamError};
pub use framing::{Framing, LengthDelimitedCodec, LineFraming};
pub use session::{DeadlineHook, StreamSession, StreamSessionBuilder, DEFAULT_QUEUE_SIZE};
pub use transport::{IoTransport, Transport};

#[cfg(feature = "metrics")]
static METRICS_INIT: std::sync::Once = std::sync::Once::new();

#[cfg(feature = "metrics")]
pub(crate) fn describe_metrics() {
    use metrics::describe_counter;

    METRICS_INIT.call_once(|| {
        describe_counter!(
            "redial_stream_messages_total",
            "Total number of stream session messages by direction (in, out)"
        );
    });
}
