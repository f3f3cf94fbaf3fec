//! Escalating backoff driven by the shared failure tracker.
//!
//! The wait before an attempt is drawn from a window whose lower bound grows
//! with both the attempt number and the process-wide failure count:
//!
//! ```text
//! lower = failures > clamp ? clamp : max(failures, attempt)   (at least `floor`)
//! upper = min(lower * 2, cap)
//! ```
//!
//! Everything is measured in whole `unit`s (one second by default), so the
//! default window never exceeds fifteen seconds and a heavily degraded system
//! settles at a 10–15 second wait.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use redispatch::backoff::EscalatingBackoff;
//!
//! let backoff = EscalatingBackoff::default();
//! // second attempt, nothing failing elsewhere
//! assert_eq!(backoff.lower_bound(2, 0), Duration::from_secs(2));
//! // a long failure streak is clamped
//! let window = backoff.window(2, 40);
//! assert_eq!(window.min(), Duration::from_secs(10));
//! assert_eq!(window.max(), Duration::from_secs(15));
//! ```

use std::fmt;
use std::time::Duration;

/// Default length of one backoff unit.
pub const DEFAULT_UNIT: Duration = Duration::from_secs(1);
/// Failure count above which the lower bound stops growing.
pub const DEFAULT_FAILURE_CLAMP: u64 = 10;
/// Upper bound of any window, in units.
pub const DEFAULT_CAP_UNITS: u64 = 15;
/// Smallest lower bound, in units.
pub const DEFAULT_FLOOR_UNITS: u64 = 1;

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    ZeroUnit,
    ZeroFloor,
    CapBelowClamp { clamp: u64, cap: u64 },
    CapBelowFloor { floor: u64, cap: u64 },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ZeroUnit => write!(f, "backoff unit must be greater than zero"),
            BackoffError::ZeroFloor => write!(f, "backoff floor must be at least one unit"),
            BackoffError::CapBelowClamp { clamp, cap } => {
                write!(f, "cap ({} units) must be >= failure clamp ({})", cap, clamp)
            }
            BackoffError::CapBelowFloor { floor, cap } => {
                write!(f, "cap ({} units) must be >= floor ({} units)", cap, floor)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

/// Inclusive range a single backoff delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffWindow {
    min: Duration,
    max: Duration,
}

impl BackoffWindow {
    /// Build a window; bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Whether `delay` falls inside the window.
    pub fn contains(&self, delay: Duration) -> bool {
        delay >= self.min && delay <= self.max
    }
}

/// Backoff whose floor escalates with the shared failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalatingBackoff {
    unit: Duration,
    failure_clamp: u64,
    cap_units: u64,
    floor_units: u64,
}

impl Default for EscalatingBackoff {
    fn default() -> Self {
        Self {
            unit: DEFAULT_UNIT,
            failure_clamp: DEFAULT_FAILURE_CLAMP,
            cap_units: DEFAULT_CAP_UNITS,
            floor_units: DEFAULT_FLOOR_UNITS,
        }
    }
}

impl EscalatingBackoff {
    /// Default shape with a custom unit (tests commonly use milliseconds).
    pub fn with_unit(unit: Duration) -> Result<Self, BackoffError> {
        Self::default().unit(unit)
    }

    /// Replace the unit.
    pub fn unit(mut self, unit: Duration) -> Result<Self, BackoffError> {
        self.unit = unit;
        self.validate()
    }

    /// Replace the failure clamp.
    pub fn failure_clamp(mut self, clamp: u64) -> Result<Self, BackoffError> {
        self.failure_clamp = clamp;
        self.validate()
    }

    /// Replace the cap, in units.
    pub fn cap(mut self, cap_units: u64) -> Result<Self, BackoffError> {
        self.cap_units = cap_units;
        self.validate()
    }

    /// Replace the floor, in units.
    pub fn floor(mut self, floor_units: u64) -> Result<Self, BackoffError> {
        self.floor_units = floor_units;
        self.validate()
    }

    fn validate(self) -> Result<Self, BackoffError> {
        if self.unit.is_zero() {
            return Err(BackoffError::ZeroUnit);
        }
        if self.floor_units == 0 {
            return Err(BackoffError::ZeroFloor);
        }
        if self.cap_units < self.failure_clamp {
            return Err(BackoffError::CapBelowClamp {
                clamp: self.failure_clamp,
                cap: self.cap_units,
            });
        }
        if self.cap_units < self.floor_units {
            return Err(BackoffError::CapBelowFloor { floor: self.floor_units, cap: self.cap_units });
        }
        Ok(self)
    }

    pub fn unit_duration(&self) -> Duration {
        self.unit
    }

    pub fn failure_clamp_value(&self) -> u64 {
        self.failure_clamp
    }

    pub fn cap_units(&self) -> u64 {
        self.cap_units
    }

    pub fn floor_units(&self) -> u64 {
        self.floor_units
    }

    /// Lower bound in units for the upcoming `attempt` given the current `failures`.
    pub fn lower_units(&self, attempt: u32, failures: u64) -> u64 {
        let escalated = if failures > self.failure_clamp {
            self.failure_clamp
        } else {
            failures.max(u64::from(attempt)).min(self.failure_clamp)
        };
        escalated.max(self.floor_units)
    }

    /// Upper bound in units for the upcoming `attempt` given the current `failures`.
    pub fn upper_units(&self, attempt: u32, failures: u64) -> u64 {
        self.lower_units(attempt, failures).saturating_mul(2).min(self.cap_units)
    }

    /// Lower bound as a duration.
    pub fn lower_bound(&self, attempt: u32, failures: u64) -> Duration {
        self.units(self.lower_units(attempt, failures))
    }

    /// Full window for the upcoming `attempt`.
    pub fn window(&self, attempt: u32, failures: u64) -> BackoffWindow {
        BackoffWindow::new(
            self.units(self.lower_units(attempt, failures)),
            self.units(self.upper_units(attempt, failures)),
        )
    }

    fn units(&self, count: u64) -> Duration {
        let count = u32::try_from(count).unwrap_or(u32::MAX); // saturate rather than wrap
        self.unit.saturating_mul(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn attempt_drives_bound_when_failures_are_low() {
        let b = EscalatingBackoff::default();
        assert_eq!(b.window(2, 0), BackoffWindow::new(secs(2), secs(4)));
        assert_eq!(b.window(3, 1), BackoffWindow::new(secs(3), secs(6)));
        assert_eq!(b.window(4, 0), BackoffWindow::new(secs(4), secs(8)));
    }

    #[test]
    fn failures_drive_bound_when_higher_than_attempt() {
        let b = EscalatingBackoff::default();
        assert_eq!(b.window(2, 7), BackoffWindow::new(secs(7), secs(14)));
        assert_eq!(b.window(3, 9), BackoffWindow::new(secs(9), secs(15)));
        assert_eq!(b.window(2, 10), BackoffWindow::new(secs(10), secs(15)));
    }

    #[test]
    fn bound_is_clamped_above_ten_failures() {
        let b = EscalatingBackoff::default();
        for failures in [11, 12, 50, 10_000, u64::MAX] {
            for attempt in 1..=4 {
                assert_eq!(b.lower_bound(attempt, failures), secs(10));
                assert_eq!(b.window(attempt, failures).max(), secs(15));
            }
        }
    }

    #[test]
    fn matches_min_max_formula_for_small_values() {
        let b = EscalatingBackoff::default();
        for failures in 0..=10u64 {
            for attempt in 2..=4u32 {
                let expected = failures.max(u64::from(attempt)).min(10);
                assert_eq!(b.lower_units(attempt, failures), expected);
            }
        }
    }

    #[test]
    fn floor_applies_to_non_positive_results() {
        let b = EscalatingBackoff::default();
        assert_eq!(b.lower_units(0, 0), 1);
        assert_eq!(b.window(0, 0), BackoffWindow::new(secs(1), secs(2)));
    }

    #[test]
    fn custom_unit_scales_window() {
        let b = EscalatingBackoff::with_unit(Duration::from_millis(10)).unwrap();
        let window = b.window(3, 0);
        assert_eq!(window.min(), Duration::from_millis(30));
        assert_eq!(window.max(), Duration::from_millis(60));
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        assert_eq!(EscalatingBackoff::with_unit(Duration::ZERO), Err(BackoffError::ZeroUnit));
        assert_eq!(EscalatingBackoff::default().floor(0), Err(BackoffError::ZeroFloor));
        assert_eq!(
            EscalatingBackoff::default().cap(5),
            Err(BackoffError::CapBelowClamp { clamp: 10, cap: 5 })
        );
        let low_clamp = EscalatingBackoff::default().failure_clamp(2).unwrap();
        assert_eq!(low_clamp.cap(3).unwrap().floor(4), Err(BackoffError::CapBelowFloor { floor: 4, cap: 3 }));
    }

    #[test]
    fn window_orders_bounds_and_checks_membership() {
        let w = BackoffWindow::new(secs(8), secs(4));
        assert_eq!(w.min(), secs(4));
        assert_eq!(w.max(), secs(8));
        assert!(w.contains(secs(4)));
        assert!(w.contains(secs(8)));
        assert!(!w.contains(secs(9)));
    }

    #[test]
    fn error_messages_are_descriptive() {
        let msg = BackoffError::CapBelowClamp { clamp: 10, cap: 5 }.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("5"));
    }
}
