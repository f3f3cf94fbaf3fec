//! Classification of dispatch failures.
//!
//! A failed send is either *benign* (the referenced record is not visible yet,
//! usually because it was created concurrently and will appear shortly) or
//! *generic* (anything else, treated as a sign the downstream system is
//! unhealthy). The decision is a pure function of the error text: the error's
//! own `Display` output and every `source()` beneath it are lowercased and
//! searched for the configured patterns.
//!
//! ```rust
//! use redispatch::classify::{classify, FailureClass};
//!
//! let err = std::io::Error::new(
//!     std::io::ErrorKind::Other,
//!     "Record was not found or you do not have access to it",
//! );
//! assert_eq!(classify(&err), FailureClass::Benign);
//! ```

use crate::error::{BuildError, TargetError};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Patterns recognised as the benign "record not found / no access" race.
pub const DEFAULT_BENIGN_PATTERNS: &[&str] = &["not found or you do not have access"];

/// Kind of a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Transient record-visibility race; retried without touching the shared tracker.
    Benign,
    /// Any other failure; escalates the shared tracker.
    Generic,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Benign => write!(f, "benign"),
            FailureClass::Generic => write!(f, "generic"),
        }
    }
}

/// Result of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// The target accepted the item.
    Success,
    /// Benign failure; see [`FailureClass::Benign`].
    RetryableBenign,
    /// Generic failure; see [`FailureClass::Generic`].
    RetryableGeneric,
}

impl DispatchOutcome {
    /// Class of a failed attempt; `None` for [`DispatchOutcome::Success`].
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            DispatchOutcome::Success => None,
            DispatchOutcome::RetryableBenign => Some(FailureClass::Benign),
            DispatchOutcome::RetryableGeneric => Some(FailureClass::Generic),
        }
    }
}

impl From<FailureClass> for DispatchOutcome {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::Benign => DispatchOutcome::RetryableBenign,
            FailureClass::Generic => DispatchOutcome::RetryableGeneric,
        }
    }
}

/// Case-insensitive substring matcher over an error chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    patterns: Arc<[String]>,
}

impl Classifier {
    /// Build a classifier from patterns. Empty patterns are ignored; at least one
    /// non-empty pattern is required.
    pub fn new<I, S>(patterns: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if patterns.is_empty() {
            return Err(BuildError::EmptyClassifier);
        }
        Ok(Self { patterns: patterns.into() })
    }

    /// Lowercased patterns in match order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a single message contains any pattern.
    pub fn matches(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.patterns.iter().any(|p| lowered.contains(p.as_str()))
    }

    /// Classify an error by walking it and its sources.
    pub fn classify(&self, error: &(dyn Error + 'static)) -> FailureClass {
        let mut current = Some(error);
        while let Some(err) = current {
            if self.matches(&err.to_string()) {
                return FailureClass::Benign;
            }
            current = err.source();
        }
        FailureClass::Generic
    }

    /// Map a send result onto the attempt outcome.
    pub fn outcome<T>(&self, result: &Result<T, TargetError>) -> DispatchOutcome {
        match result {
            Ok(_) => DispatchOutcome::Success,
            Err(error) => self.classify(&**error).into(),
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_BENIGN_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Classify with the default patterns.
pub fn classify(error: &(dyn Error + 'static)) -> FailureClass {
    Classifier::default().classify(error)
}
