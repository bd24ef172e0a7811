//! Property-based tests for redial.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for address resolution, backoff and stream sessions.

pub mod address;
pub mod backoff;
pub mod stream;
