//! Error classification for the reconnect loop.
//!
//! Every error reaching the loop is sorted into one of three buckets:
//!
//! - **non-error**: a caller-initiated stop ([`RedialError::Cancelled`],
//!   [`RedialError::DoNotReconnect`]). The client stops and reports success.
//! - **retryable**: a transport condition expected to clear up on its own
//!   (refused, reset, aborted, closed, deadline exceeded, temporary OS errors,
//!   failed host lookups).
//! - **fatal**: everything else. The client stops and reports the error.
//!
//! Errors that are neither sentinels nor recognised I/O conditions fall under
//! [`UnknownErrorPolicy`]. The default is [`UnknownErrorPolicy::Fatal`]: an
//! error the classifier cannot explain stops the client rather than hammering
//! the peer. Install [`UnknownErrorPolicy::Retry`] to invert that.
//!
//! ```
//! use redial_core::classify::{is_fatal, is_non_error};
//! use redial_core::RedialError;
//! use std::io;
//!
//! let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
//! assert!(!is_fatal(&refused));
//!
//! assert!(is_fatal(&RedialError::DoNotReconnect));
//! assert!(is_non_error(Some(&RedialError::DoNotReconnect)));
//! assert!(is_non_error(None));
//! ```

use crate::error::{find_sentinel, RedialError};
use std::error::Error;
use std::io;

/// How errors the classifier does not recognise are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownErrorPolicy {
    /// Stop the client.
    #[default]
    Fatal,
    /// Keep reconnecting.
    Retry,
}

/// Outcome of classifying an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Caller-initiated stop; not reported as a failure.
    NonError,
    /// Expected transport condition; reconnect.
    Retry,
    /// Stop and report the error.
    Fatal,
}

/// Classifier carrying the policy for unrecognised errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    unknown: UnknownErrorPolicy,
}

impl Classifier {
    /// Creates a classifier with the given policy for unrecognised errors.
    pub fn new(unknown: UnknownErrorPolicy) -> Self {
        Self { unknown }
    }

    /// Returns the policy applied to unrecognised errors.
    pub fn unknown_policy(&self) -> UnknownErrorPolicy {
        self.unknown
    }

    /// Sorts an error into a [`Verdict`].
    pub fn classify(&self, err: Option<&(dyn Error + 'static)>) -> Verdict {
        let Some(err) = err else {
            return Verdict::NonError;
        };
        let verdict = if is_non_error(Some(err)) {
            Verdict::NonError
        } else if self.is_fatal(err) {
            Verdict::Fatal
        } else {
            Verdict::Retry
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(error = %err, ?verdict, "classified error");

        verdict
    }

    /// Returns `true` when the error must stop the reconnect loop.
    pub fn is_fatal(&self, err: &(dyn Error + 'static)) -> bool {
        match find_sentinel(err) {
            Some(RedialError::DoNotReconnect) => return true,
            Some(RedialError::Cancelled) => return true,
            Some(RedialError::Closed)
            | Some(RedialError::NotConnected)
            | Some(RedialError::LookupFailed { .. }) => return false,
            Some(RedialError::Panicked(_)) => return true,
            _ => {}
        }
        if is_expected(err) {
            return false;
        }
        match self.unknown {
            UnknownErrorPolicy::Fatal => true,
            UnknownErrorPolicy::Retry => false,
        }
    }
}

/// Returns `true` when the error must stop the reconnect loop, using the default policy.
pub fn is_fatal(err: &(dyn Error + 'static)) -> bool {
    Classifier::default().is_fatal(err)
}

/// Returns `true` for "no error" and for caller-initiated stops.
///
/// Non-errors end the client but are never surfaced from `wait`/`err`.
pub fn is_non_error(err: Option<&(dyn Error + 'static)>) -> bool {
    match err {
        None => true,
        Some(err) => matches!(
            find_sentinel(err),
            Some(RedialError::Cancelled) | Some(RedialError::DoNotReconnect)
        ),
    }
}

/// Returns `true` for transport conditions expected to resolve on retry.
pub fn is_expected(err: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<tokio::time::error::Elapsed>() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if is_expected_kind(io.kind()) || is_temporary_kind(io.kind()) {
                return true;
            }
            if let Some(inner) = io.get_ref() {
                current = Some(inner);
                continue;
            }
        }
        current = e.source();
    }
    false
}

/// Connection-level conditions that a redial usually fixes.
fn is_expected_kind(kind: io::ErrorKind) -> bool {
    use io::ErrorKind::*;
    matches!(
        kind,
        ConnectionRefused
            | ConnectionReset
            | ConnectionAborted
            | BrokenPipe
            | NotConnected
            | UnexpectedEof
            | TimedOut
            // A Unix socket whose listener has not created the path yet.
            | NotFound
    )
}

/// Conditions the OS reports as transient.
fn is_temporary_kind(kind: io::ErrorKind) -> bool {
    use io::ErrorKind::*;
    matches!(
        kind,
        Interrupted
            | WouldBlock
            | AddrNotAvailable
            | HostUnreachable
            | NetworkUnreachable
            | NetworkDown
            | ResourceBusy
    )
}
