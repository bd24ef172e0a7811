//! Delay strategies applied between dial attempts.
//!
//! A [`Waiter`] is consulted after every retryable failure with the number of
//! consecutive failed attempts (starting at 1; reset after each successful
//! connection). It either sleeps and returns `Ok(())`, or vetoes further
//! attempts by returning an error, which terminates the client with that error.
//!
//! Every waiter observes the client's cancellation token and returns
//! [`RedialError::Cancelled`] as soon as shutdown is requested.

use futures::future::BoxFuture;
use redial_core::backoff::IntervalFunction;
use redial_core::{BoxError, RedialError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Decides how long to pause before the next attempt, or whether to give up.
pub trait Waiter: Send + Sync {
    /// Waits before attempt `attempt + 1`, or returns an error to stop reconnecting.
    fn wait<'a>(
        &'a self,
        attempt: u32,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

impl<W: Waiter + ?Sized> Waiter for Arc<W> {
    fn wait<'a>(
        &'a self,
        attempt: u32,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        (**self).wait(attempt, cancel)
    }
}

/// Shared waiter stored in a configuration.
pub type SharedWaiter = Arc<dyn Waiter>;

/// Sleeps for `delay`, returning early with [`RedialError::Cancelled`].
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), BoxError> {
    if cancel.is_cancelled() {
        return Err(RedialError::Cancelled.boxed());
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(RedialError::Cancelled.boxed()),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Fixed pause between attempts; the default waiter.
#[derive(Debug, Clone)]
pub struct DelayWaiter {
    delay: Duration,
}

impl DelayWaiter {
    /// Creates a waiter pausing `delay` before every attempt.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Returns the configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Waiter for DelayWaiter {
    fn wait<'a>(
        &'a self,
        _attempt: u32,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(sleep_or_cancel(self.delay, cancel))
    }
}

/// Waiter driven by an [`IntervalFunction`], optionally giving up after a
/// number of consecutive failed attempts.
///
/// ```
/// use redial_client::waiter::BackoffWaiter;
/// use redial_core::ExponentialBackoff;
/// use std::time::Duration;
///
/// let waiter = BackoffWaiter::new(
///     ExponentialBackoff::new(Duration::from_millis(100)).max_interval(Duration::from_secs(5)),
/// )
/// .max_attempts(10);
/// # let _ = waiter;
/// ```
pub struct BackoffWaiter<I> {
    interval: I,
    max_attempts: Option<u32>,
}

impl<I: IntervalFunction> BackoffWaiter<I> {
    /// Creates a waiter with unlimited attempts.
    pub fn new(interval: I) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Gives up with [`RedialError::MaxAttemptsExceeded`] after `max` failed attempts.
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Returns the delay applied before attempt `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.interval.next_interval(attempt.saturating_sub(1))
    }
}

impl<I: IntervalFunction> Waiter for BackoffWaiter<I> {
    fn wait<'a>(
        &'a self,
        attempt: u32,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            if let Some(max) = self.max_attempts {
                if attempt > max {
                    return Err(RedialError::MaxAttemptsExceeded { attempts: max }.boxed());
                }
            }
            let delay = self.delay_for(attempt);
            #[cfg(feature = "tracing")]
            tracing::debug!(attempt, ?delay, "backing off before next dial");
            sleep_or_cancel(delay, cancel).await
        })
    }
}

impl<I> fmt::Debug for BackoffWaiter<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffWaiter")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Waiter backed by an async closure receiving the attempt number.
///
/// The closure's future is raced against cancellation.
pub struct FnWaiter<F> {
    f: F,
}

impl<F, Fut> FnWaiter<F>
where
    F: Fn(u32) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Waiter for FnWaiter<F>
where
    F: Fn(u32) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn wait<'a>(
        &'a self,
        attempt: u32,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        let fut = (self.f)(attempt);
        Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(RedialError::Cancelled.boxed()),
                result = fut => result,
            }
        })
    }
}

impl<F> fmt::Debug for FnWaiter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWaiter").finish_non_exhaustive()
    }
}
