//! Error types for dispatcher configuration and envelope decoding.
//!
//! None of these ever escape a dispatch: send failures are classified and
//! logged inside the loop, and decode failures turn into
//! [`Disposition::Undecodable`](crate::Disposition::Undecodable). They exist for
//! build-time validation and for the decoder seam.

use crate::backoff::BackoffError;
use thiserror::Error;

/// Error type dispatch targets report back to the loop.
///
/// Only its `Display` text and `source()` chain are inspected, so any error
/// type boxes into it.
pub type TargetError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while validating a [`DispatchConfig`](crate::DispatchConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(u32),
    /// `benign_attempt_limit` must be > 0.
    #[error("benign_attempt_limit must be > 0 (got {0})")]
    InvalidBenignLimit(u32),
    /// `item_dump_limit` must be > 0.
    #[error("item_dump_limit must be > 0")]
    InvalidDumpLimit,
    /// A classifier needs at least one non-empty pattern.
    #[error("classifier requires at least one non-empty benign pattern")]
    EmptyClassifier,
    /// Backoff parameters were rejected.
    #[error(transparent)]
    Backoff(#[from] BackoffError),
}

/// Failure to turn a raw deferred message into a [`WorkItem`](crate::WorkItem).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The envelope is structurally unusable.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// The envelope is not valid JSON for the expected request type.
    #[cfg(feature = "json")]
    #[error("envelope is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to load a [`DispatchConfig`](crate::DispatchConfig) from JSON.
#[cfg(feature = "json")]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("config is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    /// The document parsed but holds invalid values.
    #[error("invalid config: {0}")]
    Invalid(#[from] BuildError),
}
