//! Interval functions computing the pause before the next dial attempt.
//!
//! Attempts are counted from zero: `next_interval(0)` is the pause after the
//! first failure following a successful connection (or the very first dial).

use std::time::Duration;

/// Upper bound applied when an interval would otherwise overflow.
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Computes the delay before the next reconnection attempt.
pub trait IntervalFunction: Send + Sync {
    /// Returns the delay to apply before attempt `attempt + 1`.
    fn next_interval(&self, attempt: u32) -> Duration;
}

impl<T: IntervalFunction + ?Sized> IntervalFunction for std::sync::Arc<T> {
    fn next_interval(&self, attempt: u32) -> Duration {
        (**self).next_interval(attempt)
    }
}

/// Same delay for every attempt.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    /// Creates a fixed interval.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: u32) -> Duration {
        self.duration
    }
}

/// Delay growing by a constant increment, capped at a maximum.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    initial: Duration,
    increment: Duration,
    max: Duration,
}

impl LinearBackoff {
    /// Creates a linear backoff starting at `initial` and growing by `increment`.
    pub fn new(initial: Duration, increment: Duration) -> Self {
        Self {
            initial,
            increment,
            max: MAX_INTERVAL,
        }
    }

    /// Caps the delay.
    pub fn max_interval(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }
}

impl IntervalFunction for LinearBackoff {
    fn next_interval(&self, attempt: u32) -> Duration {
        self.increment
            .checked_mul(attempt)
            .and_then(|grown| self.initial.checked_add(grown))
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Exponential backoff with a configurable multiplier.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
}

impl ExponentialBackoff {
    /// Creates an exponential backoff doubling from `initial_interval`.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: None,
        }
    }

    /// Sets the growth multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Caps the delay.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    fn raw_interval(&self, attempt: u32) -> Duration {
        let cap = self.max_interval.unwrap_or(MAX_INTERVAL);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map(|d| d.min(cap))
            .unwrap_or(cap)
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, attempt: u32) -> Duration {
        self.raw_interval(attempt)
    }
}

/// Exponential backoff with jitter, spreading out clients that lost the same peer.
#[derive(Debug, Clone)]
pub struct ExponentialRandomBackoff {
    inner: ExponentialBackoff,
    randomization_factor: f64,
}

impl ExponentialRandomBackoff {
    /// Creates a jittered exponential backoff.
    ///
    /// A `randomization_factor` of 0.5 spreads each delay over 50%..150% of
    /// the exponential value.
    pub fn new(initial_interval: Duration, randomization_factor: f64) -> Self {
        Self {
            inner: ExponentialBackoff::new(initial_interval),
            randomization_factor: randomization_factor.clamp(0.0, 1.0),
        }
    }

    /// Sets the growth multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.inner = self.inner.multiplier(multiplier);
        self
    }

    /// Caps the delay before jitter is applied.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.inner = self.inner.max_interval(max_interval);
        self
    }

    fn randomize(&self, duration: Duration) -> Duration {
        use rand::Rng;
        let delta = duration.as_secs_f64() * self.randomization_factor;
        if delta <= 0.0 {
            return duration;
        }
        let base = duration.as_secs_f64();
        let randomized = rand::rng().random_range((base - delta)..=(base + delta));
        Duration::try_from_secs_f64(randomized.max(0.0)).unwrap_or(duration)
    }
}

impl IntervalFunction for ExponentialRandomBackoff {
    fn next_interval(&self, attempt: u32) -> Duration {
        self.randomize(self.inner.raw_interval(attempt))
    }
}

/// Interval backed by a closure.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    /// Wraps a closure mapping the attempt number to a delay.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn next_interval(&self, attempt: u32) -> Duration {
        (self.f)(attempt)
    }
}

impl<F> std::fmt::Debug for FnInterval<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnInterval").field("f", &"<closure>").finish()
    }
}
