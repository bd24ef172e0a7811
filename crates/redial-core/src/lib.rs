//! Core infrastructure for redial.
//!
//! This crate provides the pieces shared by the client and the stream layer:
//! - Sentinel errors ([`RedialError`]) and error aliases
//! - The error classifier deciding fatal / retryable / non-error
//! - Backoff interval functions used by waiters
//! - The event system for observability

pub mod backoff;
pub mod classify;
pub mod error;
pub mod events;

pub use backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
    LinearBackoff,
};
pub use classify::{is_fatal, is_non_error, Classifier, UnknownErrorPolicy, Verdict};
pub use error::{BoxError, RedialError, Result, SharedError};
pub use events::{EventListener, EventListeners, RedialEvent};
