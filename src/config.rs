//! Dispatcher configuration.
//!
//! [`DispatchConfig`] is a validated value: once built, every field is usable
//! as-is by the dispatch loop. Dispatchers hold it inside a
//! [`DynamicConfig`] so it can be replaced while loops are in flight; each
//! attempt reads the latest snapshot.
//!
//! ```rust
//! use redispatch::DispatchConfig;
//!
//! let config = DispatchConfig::builder()
//!     .max_attempts(6)
//!     .benign_attempt_limit(2)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_attempts(), 6);
//! assert_eq!(config.item_dump_limit(), 300);
//! ```

use crate::backoff::EscalatingBackoff;
use crate::classify::Classifier;
use crate::error::BuildError;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Total attempts per work item.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
/// Attempt at which a persisting benign failure is abandoned.
pub const DEFAULT_BENIGN_ATTEMPT_LIMIT: u32 = 3;
/// Characters of the request dump included in log records.
pub const DEFAULT_ITEM_DUMP_LIMIT: usize = 300;

/// Validated dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    max_attempts: u32,
    benign_attempt_limit: u32,
    item_dump_limit: usize,
    backoff: EscalatingBackoff,
    classifier: Classifier,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            benign_attempt_limit: DEFAULT_BENIGN_ATTEMPT_LIMIT,
            item_dump_limit: DEFAULT_ITEM_DUMP_LIMIT,
            backoff: EscalatingBackoff::default(),
            classifier: Classifier::default(),
        }
    }
}

impl DispatchConfig {
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::new()
    }

    /// Total attempts (initial + redeliveries).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// A benign failure on this attempt (or later) ends the loop.
    pub fn benign_attempt_limit(&self) -> u32 {
        self.benign_attempt_limit
    }

    pub fn item_dump_limit(&self) -> usize {
        self.item_dump_limit
    }

    pub fn backoff(&self) -> &EscalatingBackoff {
        &self.backoff
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Load from a JSON document; absent fields keep their defaults.
    ///
    /// ```rust
    /// # #[cfg(feature = "json")] {
    /// let config = redispatch::DispatchConfig::from_json(
    ///     r#"{"max_attempts": 5, "backoff_unit_millis": 250, "benign_patterns": ["entity missing"]}"#,
    /// ).unwrap();
    /// assert_eq!(config.max_attempts(), 5);
    /// # }
    /// ```
    #[cfg(feature = "json")]
    pub fn from_json(document: &str) -> Result<Self, crate::error::ConfigError> {
        let raw: RawConfig = serde_json::from_str(document)?;
        Ok(raw.into_builder()?.build()?)
    }
}

/// Builder for [`DispatchConfig`].
#[derive(Debug, Clone)]
pub struct DispatchConfigBuilder {
    max_attempts: u32,
    benign_attempt_limit: u32,
    item_dump_limit: usize,
    backoff: EscalatingBackoff,
    classifier: Classifier,
}

impl DispatchConfigBuilder {
    pub fn new() -> Self {
        let defaults = DispatchConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            benign_attempt_limit: defaults.benign_attempt_limit,
            item_dump_limit: defaults.item_dump_limit,
            backoff: defaults.backoff,
            classifier: defaults.classifier,
        }
    }

    /// Set total attempts (initial + redeliveries). Must be > 0.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the attempt at which a benign failure is abandoned. Must be > 0.
    pub fn benign_attempt_limit(mut self, limit: u32) -> Self {
        self.benign_attempt_limit = limit;
        self
    }

    /// Set how many characters of the request dump are logged. Must be > 0.
    pub fn item_dump_limit(mut self, limit: usize) -> Self {
        self.item_dump_limit = limit;
        self
    }

    pub fn backoff(mut self, backoff: EscalatingBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<DispatchConfig, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        if self.benign_attempt_limit == 0 {
            return Err(BuildError::InvalidBenignLimit(0));
        }
        if self.item_dump_limit == 0 {
            return Err(BuildError::InvalidDumpLimit);
        }
        Ok(DispatchConfig {
            max_attempts: self.max_attempts,
            benign_attempt_limit: self.benign_attempt_limit,
            item_dump_limit: self.item_dump_limit,
            backoff: self.backoff,
            classifier: self.classifier,
        })
    }
}

impl Default for DispatchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "json")]
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    max_attempts: Option<u32>,
    benign_attempt_limit: Option<u32>,
    item_dump_limit: Option<usize>,
    backoff_unit_millis: Option<u64>,
    failure_clamp: Option<u64>,
    backoff_cap_units: Option<u64>,
    backoff_floor_units: Option<u64>,
    benign_patterns: Option<Vec<String>>,
}

#[cfg(feature = "json")]
impl RawConfig {
    fn into_builder(self) -> Result<DispatchConfigBuilder, BuildError> {
        let mut builder = DispatchConfigBuilder::new();
        if let Some(n) = self.max_attempts {
            builder = builder.max_attempts(n);
        }
        if let Some(n) = self.benign_attempt_limit {
            builder = builder.benign_attempt_limit(n);
        }
        if let Some(n) = self.item_dump_limit {
            builder = builder.item_dump_limit(n);
        }

        // cap before clamp so raising both in one document validates
        let mut backoff = EscalatingBackoff::default();
        if let Some(ms) = self.backoff_unit_millis {
            backoff = backoff.unit(std::time::Duration::from_millis(ms))?;
        }
        if let Some(cap) = self.backoff_cap_units {
            backoff = backoff.cap(cap.max(backoff.failure_clamp_value()))?;
        }
        if let Some(clamp) = self.failure_clamp {
            backoff = backoff.failure_clamp(clamp)?;
        }
        if let Some(cap) = self.backoff_cap_units {
            backoff = backoff.cap(cap)?;
        }
        if let Some(floor) = self.backoff_floor_units {
            backoff = backoff.floor(floor)?;
        }
        builder = builder.backoff(backoff);

        if let Some(patterns) = self.benign_patterns {
            builder = builder.classifier(Classifier::new(patterns)?);
        }
        Ok(builder)
    }
}

/// `DynamicConfig<T>` gives cheap reads and atomic replacement of shared config.
///
/// Clones share the same value.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Replace the value with one derived from the current snapshot.
    ///
    /// Concurrent updates are applied one after another; none is lost.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T,
    {
        self.inner.rcu(|current| Arc::new(f(&**current)));
    }
}

impl<T: Default> Default for DynamicConfig<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for DynamicConfig<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
