//! Structured dispatch events.
//!
//! Besides its `tracing` log records, the dispatcher reports what it did as
//! [`DispatchEvent`]s. Events flow into a sink, which is any
//! `tower::Service<DispatchEvent>`; sinks can log, aggregate, or forward them.
//!
//! ```rust
//! use redispatch::telemetry::{DispatchEvent, MemorySink};
//! use redispatch::{Dispatcher, InstantSleeper, ServiceTarget, WorkItem};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let target = ServiceTarget::new(tower::service_fn(|_: u32| async { Ok::<_, std::io::Error>(()) }));
//! let sink = MemorySink::new();
//! let dispatcher = Dispatcher::builder(target)
//!     .with_sleeper(InstantSleeper)
//!     .with_sink(sink.clone())
//!     .build();
//! dispatcher.dispatch(WorkItem::void(7u32)).await;
//! assert_eq!(sink.events(), vec![DispatchEvent::Delivered { attempts: 1, recovered_from: 0 }]);
//! # });
//! ```

use crate::classify::FailureClass;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// Events emitted while redelivering one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A send failed.
    AttemptFailed {
        /// Attempt number (1-indexed).
        attempt: u32,
        /// How the failure was classified.
        class: FailureClass,
        /// Shared failure count when the failure was handled.
        failures: u64,
    },
    /// A delay was chosen before the next attempt.
    BackoffScheduled {
        /// The attempt that will run after the delay.
        next_attempt: u32,
        delay: Duration,
        /// Shared failure count the delay was computed from.
        failures: u64,
    },
    /// The target accepted the item.
    Delivered {
        attempts: u32,
        /// Shared failure count this success cleared.
        recovered_from: u64,
    },
    /// The benign condition persisted past its attempt limit.
    Abandoned { attempts: u32 },
    /// The attempt budget ran out.
    Exhausted { attempts: u32 },
    /// The caller cancelled the redelivery.
    Cancelled { attempts: u32 },
    /// A raw message could not be decoded; nothing was sent.
    Undecodable,
}

impl fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchEvent::AttemptFailed { attempt, class, failures } => {
                write!(f, "AttemptFailed(#{}, class={}, failures={})", attempt, class, failures)
            }
            DispatchEvent::BackoffScheduled { next_attempt, delay, failures } => write!(
                f,
                "BackoffScheduled(next=#{}, delay={:?}, failures={})",
                next_attempt, delay, failures
            ),
            DispatchEvent::Delivered { attempts, recovered_from } => {
                write!(f, "Delivered(attempts={}, recovered_from={})", attempts, recovered_from)
            }
            DispatchEvent::Abandoned { attempts } => write!(f, "Abandoned(attempts={})", attempts),
            DispatchEvent::Exhausted { attempts } => write!(f, "Exhausted(attempts={})", attempts),
            DispatchEvent::Cancelled { attempts } => write!(f, "Cancelled(attempts={})", attempts),
            DispatchEvent::Undecodable => write!(f, "Undecodable"),
        }
    }
}

/// A sink that consumes dispatch events.
pub trait DispatchSink:
    tower::Service<DispatchEvent, Response = (), Error = Self::SinkError> + Clone + Send + Sync + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that polls `poll_ready` once and swallows errors.
///
/// Telemetry never holds up a redelivery: if a sink is not ready on the first
/// poll, or fails, the event is dropped.
pub async fn emit_best_effort<S>(sink: S, event: DispatchEvent)
where
    S: tower::Service<DispatchEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    match sink.ready_oneshot().now_or_never() {
        Some(Ok(mut ready_sink)) => {
            let _ = ready_sink.call(event).await;
        }
        Some(Err(_)) => {}
        None => {
            tracing::debug!(target: "redispatch::telemetry", event = %event, "sink not ready; event dropped");
        }
    }
}

type EmitFn = dyn Fn(DispatchEvent) -> BoxFuture<'static, ()> + Send + Sync;

/// Type-erased handle the dispatcher emits through.
#[derive(Clone, Default)]
pub(crate) struct Emitter {
    emit: Option<Arc<EmitFn>>,
}

impl Emitter {
    pub(crate) fn from_sink<S>(sink: S) -> Self
    where
        S: DispatchSink,
        S::Future: Send + 'static,
    {
        Self { emit: Some(Arc::new(move |event| emit_best_effort(sink.clone(), event).boxed())) }
    }

    pub(crate) async fn emit(&self, event: DispatchEvent) {
        if let Some(emit) = &self.emit {
            emit(event).await;
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("sink", &self.emit.as_ref().map(|_| "<sink>")).finish()
    }
}

type ReadyFuture = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

/// A no-op sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<DispatchEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = ReadyFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: DispatchEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl DispatchSink for NullSink {
    type SinkError = Infallible;
}

/// A sink that logs every event through `tracing` at debug level.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<DispatchEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = ReadyFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DispatchEvent) -> Self::Future {
        tracing::debug!(target: "redispatch::telemetry", event = %event, "dispatch_event");
        Box::pin(async { Ok(()) })
    }
}

impl DispatchSink for LogSink {
    type SinkError = Infallible;
}

/// A bounded in-memory sink; oldest events are evicted once full.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<DispatchEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.lock().clone()
    }

    /// Number of recorded events matching `predicate`.
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&DispatchEvent) -> bool,
    {
        self.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DispatchEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<DispatchEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = ReadyFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DispatchEvent) -> Self::Future {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl DispatchSink for MemorySink {
    type SinkError = Infallible;
}
