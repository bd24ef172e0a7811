//! Property tests for reconnect interval functions.
//!
//! Invariants tested:
//! - Exponential intervals never shrink as attempts grow
//! - Every interval respects the configured cap
//! - Jittered intervals stay within the randomization window
//! - Backoff waiters give up exactly after `max_attempts`

use proptest::prelude::*;
use redial::client::{BackoffWaiter, Waiter};
use redial::core::backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, IntervalFunction, LinearBackoff,
};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: exponential backoff is monotonic and capped
    #[test]
    fn exponential_is_monotonic_and_capped(
        initial_ms in 1u64..1_000,
        multiplier in 1.0f64..4.0,
        cap_ms in 1u64..60_000,
    ) {
        let cap = Duration::from_millis(cap_ms);
        let backoff = ExponentialBackoff::new(Duration::from_millis(initial_ms))
            .multiplier(multiplier)
            .max_interval(cap);

        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let interval = backoff.next_interval(attempt);
            prop_assert!(interval >= previous, "attempt {} shrank: {:?} < {:?}", attempt, interval, previous);
            prop_assert!(interval <= cap);
            previous = interval;
        }
    }

    /// Property: linear backoff grows by the increment until the cap
    #[test]
    fn linear_grows_until_cap(
        initial_ms in 0u64..1_000,
        step_ms in 1u64..1_000,
        attempt in 0u32..50,
    ) {
        let cap = Duration::from_secs(10);
        let backoff = LinearBackoff::new(Duration::from_millis(initial_ms), Duration::from_millis(step_ms))
            .max_interval(cap);

        let expected = Duration::from_millis(initial_ms + step_ms * u64::from(attempt)).min(cap);
        prop_assert_eq!(backoff.next_interval(attempt), expected);
    }

    /// Property: jitter stays within the randomization factor
    #[test]
    fn jitter_stays_in_window(
        initial_ms in 10u64..1_000,
        factor in 0.0f64..1.0,
        attempt in 0u32..8,
    ) {
        let backoff = ExponentialRandomBackoff::new(Duration::from_millis(initial_ms), factor);
        let base = ExponentialBackoff::new(Duration::from_millis(initial_ms)).next_interval(attempt);

        let interval = backoff.next_interval(attempt).as_secs_f64();
        let low = base.as_secs_f64() * (1.0 - factor);
        let high = base.as_secs_f64() * (1.0 + factor);
        prop_assert!(interval >= low - 1e-6 && interval <= high + 1e-6);
    }

    /// Property: a backoff waiter vetoes exactly after max_attempts
    #[test]
    fn backoff_waiter_respects_max_attempts(max in 1u32..6) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let waiter = BackoffWaiter::new(ExponentialBackoff::new(Duration::from_micros(1)))
                .max_attempts(max);
            let cancel = CancellationToken::new();

            for attempt in 1..=max {
                prop_assert!(waiter.wait(attempt, &cancel).await.is_ok());
            }
            prop_assert!(waiter.wait(max + 1, &cancel).await.is_err());
            Ok(())
        })?;
    }
}
