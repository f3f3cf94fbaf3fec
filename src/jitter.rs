//! Random delay selection inside a backoff window.
//!
//! - `Uniform`: uniform in `[min, max]` using `rand`'s thread-local RNG. Production default.
//! - `Seeded`: same distribution from a shared, seeded `StdRng`; reproducible runs.
//! - `LowerBound`: always `min`; deterministic tests that assert exact delays.
//!
//! Draws have millisecond resolution. Millisecond conversions saturate to `u64::MAX`.

use crate::backoff::BackoffWindow;
use rand::rngs::StdRng;
use rand::{rng, Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Strategy for picking a delay from a [`BackoffWindow`].
#[derive(Debug, Clone, Default)]
pub enum Jitter {
    /// Uniform over the window, thread-local RNG.
    #[default]
    Uniform,
    /// Uniform over the window, shared seeded RNG.
    Seeded(Arc<Mutex<StdRng>>),
    /// Always the window's lower bound.
    LowerBound,
}

impl Jitter {
    pub fn uniform() -> Self {
        Jitter::Uniform
    }

    pub fn seeded(seed: u64) -> Self {
        Jitter::Seeded(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))))
    }

    pub fn lower_bound() -> Self {
        Jitter::LowerBound
    }

    /// Pick a delay within `window`.
    pub fn sample(&self, window: BackoffWindow) -> Duration {
        match self {
            Jitter::Uniform => Self::draw(window, &mut rng()),
            Jitter::Seeded(source) => {
                // the lock covers one draw only
                let mut guard = source.lock().unwrap_or_else(PoisonError::into_inner);
                Self::draw(window, &mut *guard)
            }
            Jitter::LowerBound => window.min(),
        }
    }

    /// Pick a delay with a caller-supplied RNG; `LowerBound` ignores it.
    pub fn sample_with_rng<R: Rng>(&self, window: BackoffWindow, rng: &mut R) -> Duration {
        match self {
            Jitter::LowerBound => window.min(),
            _ => Self::draw(window, rng),
        }
    }

    fn as_millis_saturated(duration: Duration) -> u64 {
        duration.as_millis().try_into().unwrap_or(u64::MAX)
    }

    fn draw<R: Rng>(window: BackoffWindow, rng: &mut R) -> Duration {
        let low = Self::as_millis_saturated(window.min());
        let high = Self::as_millis_saturated(window.max());
        if high <= low {
            return window.min();
        }
        Duration::from_millis(rng.random_range(low..=high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(min: u64, max: u64) -> BackoffWindow {
        BackoffWindow::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    #[test]
    fn uniform_stays_inside_window() {
        let jitter = Jitter::uniform();
        let w = window(3, 6);
        for _ in 0..200 {
            assert!(w.contains(jitter.sample(w)));
        }
    }

    #[test]
    fn uniform_actually_varies() {
        let jitter = Jitter::uniform();
        let w = window(10, 15);
        let draws: std::collections::HashSet<Duration> = (0..50).map(|_| jitter.sample(w)).collect();
        assert!(draws.len() > 1, "50 draws over a 5s window should not all coincide");
    }

    #[test]
    fn lower_bound_is_exact() {
        let jitter = Jitter::lower_bound();
        assert_eq!(jitter.sample(window(4, 8)), Duration::from_secs(4));
    }

    #[test]
    fn seeded_is_reproducible() {
        let a = Jitter::seeded(42);
        let b = Jitter::seeded(42);
        let w = window(2, 4);
        let first: Vec<Duration> = (0..10).map(|_| a.sample(w)).collect();
        let second: Vec<Duration> = (0..10).map(|_| b.sample(w)).collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|d| w.contains(*d)));
    }

    #[test]
    fn seeded_clones_share_the_stream() {
        let a = Jitter::seeded(7);
        let b = a.clone();
        let fresh = Jitter::seeded(7);
        let w = window(1, 15);
        let interleaved = [a.sample(w), b.sample(w)];
        let sequential = [fresh.sample(w), fresh.sample(w)];
        assert_eq!(interleaved, sequential);
    }

    #[test]
    fn degenerate_window_returns_min() {
        let w = window(5, 5);
        assert_eq!(Jitter::uniform().sample(w), Duration::from_secs(5));
    }

    #[test]
    fn explicit_rng_is_used() {
        let mut rng = StdRng::seed_from_u64(99);
        let w = window(2, 4);
        let d = Jitter::uniform().sample_with_rng(w, &mut rng);
        assert!(w.contains(d));
        assert_eq!(Jitter::lower_bound().sample_with_rng(w, &mut rng), Duration::from_secs(2));
    }

    #[test]
    fn saturates_large_windows_without_panicking() {
        let w = BackoffWindow::new(Duration::from_secs(1), Duration::MAX);
        let d = Jitter::seeded(1).sample(w);
        assert!(d >= Duration::from_secs(1));
    }
}
