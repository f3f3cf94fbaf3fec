#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # redispatch
//!
//! Redelivery of deferred work items to an in-process handler, with failure
//! classification, escalating jittered backoff, and a process-wide failure
//! signal shared by every concurrent redelivery.
//!
//! ## Features
//!
//! - **Classified retries**: "record not found / no access" failures are
//!   treated as benign lag and abandoned after a few attempts; everything else
//!   is retried up to the attempt budget
//! - **Escalating backoff**: the delay window grows with the attempt number and
//!   with the number of unresolved failures seen across the process
//! - **Lock-free failure tracker** shared by concurrent loops
//! - **Cancellation** through `tokio_util::sync::CancellationToken`
//! - **Telemetry sinks** built on `tower::Service`
//! - **Live configuration** swaps via [`DynamicConfig`]
//!
//! ## Quick Start
//!
//! ```rust
//! use redispatch::{Dispatcher, FailureTracker, ServiceTarget, WorkItem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tracker = FailureTracker::new();
//!     let target = ServiceTarget::new(tower::service_fn(|order_id: u64| async move {
//!         // Your handler here
//!         Ok::<_, std::io::Error>(order_id)
//!     }));
//!
//!     let dispatcher = Dispatcher::builder(target).with_tracker(tracker.clone()).build();
//!     let outcome = dispatcher.dispatch(WorkItem::void(7u64)).await;
//!     assert!(outcome.is_delivered());
//! }
//! ```

pub mod backoff;
pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod jitter;
pub mod prelude;
pub mod sleeper;
pub mod target;
pub mod telemetry;
pub mod tracker;

// Re-exports
pub use backoff::{BackoffError, BackoffWindow, EscalatingBackoff};
pub use classify::{Classifier, DispatchOutcome, FailureClass};
pub use config::{DispatchConfig, DispatchConfigBuilder, DynamicConfig};
pub use dispatcher::{Dispatcher, DispatcherBuilder, Disposition};
#[cfg(feature = "json")]
pub use envelope::JsonEnvelopeDecoder;
pub use envelope::EnvelopeDecoder;
#[cfg(feature = "json")]
pub use error::ConfigError;
pub use error::{BuildError, DecodeError, TargetError};
pub use jitter::Jitter;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use target::{DispatchTarget, ResponseKind, ServiceTarget, WorkItem};
pub use telemetry::{DispatchEvent, DispatchSink, LogSink, MemorySink, NullSink};
pub use tracker::FailureTracker;
pub use tokio_util::sync::CancellationToken;
