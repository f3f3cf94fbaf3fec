//! Convenient re-exports for common redispatch types.
pub use crate::{
    backoff::{BackoffWindow, EscalatingBackoff},
    classify::{Classifier, FailureClass},
    config::{DispatchConfig, DynamicConfig},
    dispatcher::{Dispatcher, Disposition},
    envelope::EnvelopeDecoder,
    jitter::Jitter,
    sleeper::{InstantSleeper, Sleeper, TokioSleeper},
    target::{DispatchTarget, ServiceTarget, WorkItem},
    telemetry::{DispatchEvent, LogSink, MemorySink},
    tracker::FailureTracker,
    CancellationToken, TargetError,
};
