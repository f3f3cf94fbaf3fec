//! Process-wide count of consecutive dispatch failures.
//!
//! One tracker is shared by every dispatcher in the process (clone the handle,
//! do not build a new one per loop). Any successful send resets it; generic
//! failures that will be retried bump it. The value is unbounded here; the
//! backoff calculation clamps it where it is used.
//!
//! All operations are single atomic instructions, so concurrent loops never
//! lose an update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared consecutive-failure counter.
///
/// Clones observe and mutate the same value.
#[derive(Debug, Clone, Default)]
pub struct FailureTracker {
    failures: Arc<AtomicU64>,
}

impl FailureTracker {
    /// Create a tracker starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure and return the new value.
    pub fn increment(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Clear the counter, returning the value it held.
    pub fn reset(&self) -> u64 {
        self.failures.swap(0, Ordering::AcqRel)
    }

    /// Current number of consecutive failures.
    pub fn current(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Whether `other` is a handle to the same counter.
    pub fn shares_with(&self, other: &FailureTracker) -> bool {
        Arc::ptr_eq(&self.failures, &other.failures)
    }
}
