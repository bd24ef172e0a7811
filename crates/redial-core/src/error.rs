//! Sentinel errors shared by every redial crate.
//!
//! Callers pattern-match on [`RedialError`] to distinguish configuration
//! problems, lifecycle misuse and the explicit "stop reconnecting" request from
//! ordinary transport failures.
//!
//! Errors produced by callbacks travel as [`BoxError`]. Once an error becomes
//! the terminal cause of a client it is stored as a [`SharedError`] so that it
//! can be handed out any number of times and still be downcast by the caller:
//!
//! ```
//! use redial_core::{RedialError, SharedError};
//! use std::sync::Arc;
//!
//! let cause: SharedError = Arc::new(RedialError::NotConnected);
//! assert_eq!(
//!     cause.downcast_ref::<RedialError>(),
//!     Some(&RedialError::NotConnected)
//! );
//! ```

use std::sync::Arc;

/// Type-erased error returned by callbacks and tasks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reference-counted error recorded as a terminal cause.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for redial operations.
pub type Result<T> = std::result::Result<T, RedialError>;

/// Stable error values exposed by redial.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedialError {
    /// The configuration is already bound to another client.
    #[error("config is already bound to a client")]
    ConfigBusy,

    /// `connect` was called on a client that is already running.
    #[error("client is already running")]
    Running,

    /// No connection is currently active.
    #[error("not connected")]
    NotConnected,

    /// Returned by a callback to stop the client without reporting a failure.
    #[error("do not reconnect")]
    DoNotReconnect,

    /// `connect` was called on a client that was shut down before it started.
    #[error("abnormal connect: client was shut down before it started")]
    AbnormalConnect,

    /// A Unix socket path or abstract name is empty.
    #[error("socket name is empty")]
    NameEmpty,

    /// A Unix socket path or abstract name exceeds the platform limit.
    #[error("socket name is too long ({len} bytes, max {max})")]
    NameTooLong {
        /// Length of the rejected name in bytes.
        len: usize,
        /// Maximum accepted length in bytes.
        max: usize,
    },

    /// A Unix socket path or abstract name contains a NUL byte.
    #[error("socket name contains a NUL byte")]
    NameContainsNul,

    /// The remote address is empty.
    #[error("remote address is empty")]
    EmptyAddress,

    /// The TCP address has no port.
    #[error("missing port in address {0:?}")]
    MissingPort(String),

    /// The TCP host is empty or unspecified.
    #[error("invalid host in address {0:?}")]
    InvalidHost(String),

    /// The TCP port is zero or not a number.
    #[error("invalid port in address {0:?}")]
    InvalidPort(String),

    /// Resolving a TCP host name failed.
    ///
    /// The resolver does not report whether a failure is temporary, so every
    /// lookup failure is treated as retryable.
    #[error("lookup of {address} failed: {reason}")]
    LookupFailed {
        /// The `host:port` being resolved.
        address: String,
        /// The resolver's message.
        reason: String,
    },

    /// The resource (queue, session, connection) has been closed.
    #[error("closed")]
    Closed,

    /// The operation was cancelled by a shutdown request.
    #[error("operation cancelled")]
    Cancelled,

    /// A supervised task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// A waiter gave up after the configured number of attempts.
    #[error("gave up after {attempts} reconnection attempts")]
    MaxAttemptsExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// Tasks did not finish before the shutdown deadline.
    #[error("shutdown timed out before all tasks finished")]
    ShutdownTimedOut,
}

impl RedialError {
    /// Returns `true` for errors describing a malformed remote address.
    pub fn is_address_error(&self) -> bool {
        matches!(
            self,
            RedialError::NameEmpty
                | RedialError::NameTooLong { .. }
                | RedialError::NameContainsNul
                | RedialError::EmptyAddress
                | RedialError::MissingPort(_)
                | RedialError::InvalidHost(_)
                | RedialError::InvalidPort(_)
        )
    }

    /// Boxes this error for use as a callback result.
    pub fn boxed(self) -> BoxError {
        Box::new(self)
    }
}

/// Finds the first [`RedialError`] in an error's source chain.
pub fn find_sentinel<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a RedialError> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(sentinel) = e.downcast_ref::<RedialError>() {
            return Some(sentinel);
        }
        // io::Error::source skips the payload of a custom error.
        if let Some(inner) = e
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref())
        {
            current = Some(inner);
            continue;
        }
        current = e.source();
    }
    None
}
