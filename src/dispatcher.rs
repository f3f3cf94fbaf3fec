//! The redelivery loop.
//!
//! A [`Dispatcher`] takes one decoded [`WorkItem`] at a time, sends it to its
//! [`DispatchTarget`], and on failure decides whether to try again:
//!
//! - success ends the loop and resets the shared [`FailureTracker`];
//! - a benign "record not found / no access" failure is retried without
//!   touching the tracker, and abandoned once it reaches
//!   `benign_attempt_limit` (3 by default);
//! - any other failure bumps the tracker (unless it was the last permitted
//!   attempt) and is retried until `max_attempts` (4 by default) is spent.
//!
//! Between attempts the loop sleeps for a jittered delay drawn from an
//! [`EscalatingBackoff`](crate::backoff::EscalatingBackoff) window computed
//! from the upcoming attempt number and the tracker value *at that moment*.
//!
//! Callers never see an error. Every path ends in a [`Disposition`]; failure
//! detail goes to `tracing` records (target `redispatch::dispatch`) and to the
//! optional telemetry sink.
//!
//! ```rust
//! use redispatch::{Dispatcher, Disposition, InstantSleeper, ServiceTarget, WorkItem};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let target = ServiceTarget::new(tower::service_fn(|id: u64| async move {
//!     Ok::<_, std::io::Error>(format!("synced {id}"))
//! }));
//! let dispatcher = Dispatcher::builder(target).with_sleeper(InstantSleeper).build();
//!
//! let outcome = dispatcher.dispatch(WorkItem::expecting_response(42u64)).await;
//! assert_eq!(outcome, Disposition::Delivered { attempts: 1 });
//! assert_eq!(dispatcher.tracker().current(), 0);
//! # });
//! ```

use crate::classify::FailureClass;
use crate::config::{DispatchConfig, DynamicConfig};
use crate::envelope::EnvelopeDecoder;
use crate::error::TargetError;
use crate::jitter::Jitter;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::target::{DispatchTarget, ResponseKind, WorkItem};
use crate::telemetry::{DispatchEvent, DispatchSink, Emitter};
use crate::tracker::FailureTracker;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

const LOG_TARGET: &str = "redispatch::dispatch";

/// How a redelivery ended. Carries no error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// The target accepted the item.
    Delivered { attempts: u32 },
    /// The benign condition persisted; the item was dropped.
    Abandoned { attempts: u32 },
    /// Every permitted attempt failed; the item was dropped.
    Exhausted { attempts: u32 },
    /// The caller cancelled before the loop finished.
    Cancelled { attempts: u32 },
    /// The raw message could not be decoded; nothing was sent.
    Undecodable,
}

impl Disposition {
    /// Number of sends started.
    pub fn attempts(&self) -> u32 {
        match self {
            Disposition::Delivered { attempts }
            | Disposition::Abandoned { attempts }
            | Disposition::Exhausted { attempts }
            | Disposition::Cancelled { attempts } => *attempts,
            Disposition::Undecodable => 0,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Disposition::Delivered { .. })
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Delivered { attempts } => write!(f, "delivered after {} attempt(s)", attempts),
            Disposition::Abandoned { attempts } => write!(f, "abandoned after {} attempt(s)", attempts),
            Disposition::Exhausted { attempts } => write!(f, "exhausted after {} attempt(s)", attempts),
            Disposition::Cancelled { attempts } => write!(f, "cancelled after {} attempt(s)", attempts),
            Disposition::Undecodable => write!(f, "undecodable"),
        }
    }
}

/// Redelivers work items to one target.
///
/// Cheap to clone; clones share the target, tracker, config, and sink.
pub struct Dispatcher<T> {
    target: Arc<T>,
    tracker: FailureTracker,
    config: DynamicConfig<DispatchConfig>,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
    emitter: Emitter,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            tracker: self.tracker.clone(),
            config: self.config.clone(),
            jitter: self.jitter.clone(),
            sleeper: self.sleeper.clone(),
            emitter: self.emitter.clone(),
        }
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("target", &std::any::type_name::<T>())
            .field("tracker", &self.tracker)
            .field("config", &self.config.get())
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .field("emitter", &self.emitter)
            .finish()
    }
}

impl<T> Dispatcher<T> {
    pub fn builder(target: T) -> DispatcherBuilder<T> {
        DispatcherBuilder::new(target)
    }

    /// The shared failure tracker.
    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    /// Live configuration handle; replacing the value affects the next attempt
    /// of every loop.
    pub fn config(&self) -> &DynamicConfig<DispatchConfig> {
        &self.config
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Redeliver `item` until it succeeds, is abandoned, or runs out of attempts.
    pub async fn dispatch<Req>(&self, item: WorkItem<Req>) -> Disposition
    where
        T: DispatchTarget<Req>,
        Req: fmt::Debug + Send + Sync,
    {
        self.run(&item, None).await
    }

    /// Like [`dispatch`](Self::dispatch), stopping promptly once `cancel` fires.
    ///
    /// An in-flight send or backoff sleep is abandoned; the tracker is not
    /// touched for the interrupted attempt.
    pub async fn dispatch_with_cancel<Req>(
        &self,
        item: WorkItem<Req>,
        cancel: &CancellationToken,
    ) -> Disposition
    where
        T: DispatchTarget<Req>,
        Req: fmt::Debug + Send + Sync,
    {
        self.run(&item, Some(cancel)).await
    }

    /// Decode a raw deferred message and redeliver it.
    ///
    /// Decode failures are logged and reported as [`Disposition::Undecodable`].
    pub async fn dispatch_raw<Req, D>(&self, decoder: &D, raw: &[u8]) -> Disposition
    where
        T: DispatchTarget<Req>,
        Req: fmt::Debug + Send + Sync,
        D: EnvelopeDecoder<Req> + ?Sized,
    {
        self.decode_and_run(decoder, raw, None).await
    }

    /// [`dispatch_raw`](Self::dispatch_raw) with a cancellation token.
    pub async fn dispatch_raw_with_cancel<Req, D>(
        &self,
        decoder: &D,
        raw: &[u8],
        cancel: &CancellationToken,
    ) -> Disposition
    where
        T: DispatchTarget<Req>,
        Req: fmt::Debug + Send + Sync,
        D: EnvelopeDecoder<Req> + ?Sized,
    {
        self.decode_and_run(decoder, raw, Some(cancel)).await
    }

    /// Redeliver `item` on its own tokio task.
    pub fn spawn<Req>(&self, item: WorkItem<Req>) -> JoinHandle<Disposition>
    where
        T: DispatchTarget<Req> + 'static,
        Req: fmt::Debug + Send + Sync + 'static,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(item).await })
    }

    /// Like [`spawn`](Self::spawn), with a cancellation token.
    pub fn spawn_with_cancel<Req>(
        &self,
        item: WorkItem<Req>,
        cancel: CancellationToken,
    ) -> JoinHandle<Disposition>
    where
        T: DispatchTarget<Req> + 'static,
        Req: fmt::Debug + Send + Sync + 'static,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch_with_cancel(item, &cancel).await })
    }

    async fn run<Req>(&self, item: &WorkItem<Req>, cancel: Option<&CancellationToken>) -> Disposition
    where
        T: DispatchTarget<Req>,
        Req: fmt::Debug + Send + Sync,
    {
        let mut attempt: u32 = 1;
        loop {
            let config = self.config.get();

            let sent = match cancel {
                Some(token) if token.is_cancelled() => return self.cancelled(attempt - 1).await,
                // The interrupted send counts as started.
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return self.cancelled(attempt).await,
                    sent = self.send(item) => sent,
                },
                None => self.send(item).await,
            };

            let outcome = config.classifier().outcome(&sent);
            let (class, err) = match (outcome.failure_class(), sent) {
                (Some(class), Err(err)) => (class, err),
                _ => {
                    let recovered_from = self.tracker.reset();
                    self.emitter.emit(DispatchEvent::Delivered { attempts: attempt, recovered_from }).await;
                    return Disposition::Delivered { attempts: attempt };
                }
            };

            let last_attempt = attempt >= config.max_attempts();
            let dump = item.dump(config.item_dump_limit());
            let failures = self.tracker.current();

            match class {
                FailureClass::Benign
                    if attempt >= config.benign_attempt_limit().min(config.max_attempts()) =>
                {
                    error!(
                        target: LOG_TARGET,
                        target_type = self.target.name(),
                        label = item.label().unwrap_or_default(),
                        item = %dump,
                        attempt,
                        failures,
                        error = %err,
                        "record still missing after repeated redelivery; abandoning item"
                    );
                    self.failed(attempt, class, failures).await;
                    self.emitter.emit(DispatchEvent::Abandoned { attempts: attempt }).await;
                    return Disposition::Abandoned { attempts: attempt };
                }
                FailureClass::Benign => {
                    warn!(
                        target: LOG_TARGET,
                        target_type = self.target.name(),
                        label = item.label().unwrap_or_default(),
                        item = %dump,
                        attempt,
                        failures,
                        error = %err,
                        "record not visible yet; will redeliver"
                    );
                    self.failed(attempt, class, failures).await;
                }
                FailureClass::Generic => {
                    error!(
                        target: LOG_TARGET,
                        target_type = self.target.name(),
                        label = item.label().unwrap_or_default(),
                        item = %dump,
                        attempt,
                        failures,
                        error = %err,
                        "redelivery attempt failed"
                    );
                    let failures = if last_attempt { failures } else { self.tracker.increment() };
                    self.failed(attempt, class, failures).await;
                }
            }

            if last_attempt {
                self.emitter.emit(DispatchEvent::Exhausted { attempts: attempt }).await;
                return Disposition::Exhausted { attempts: attempt };
            }

            attempt += 1;
            let failures = self.tracker.current();
            let delay = self.jitter.sample(config.backoff().window(attempt, failures));
            self.emitter
                .emit(DispatchEvent::BackoffScheduled { next_attempt: attempt, delay, failures })
                .await;

            match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return self.cancelled(attempt - 1).await,
                    _ = self.sleeper.sleep(delay) => {}
                },
                None => self.sleeper.sleep(delay).await,
            }
        }
    }

    async fn decode_and_run<Req, D>(
        &self,
        decoder: &D,
        raw: &[u8],
        cancel: Option<&CancellationToken>,
    ) -> Disposition
    where
        T: DispatchTarget<Req>,
        Req: fmt::Debug + Send + Sync,
        D: EnvelopeDecoder<Req> + ?Sized,
    {
        match decoder.decode(raw) {
            Ok(item) => self.run(&item, cancel).await,
            Err(err) => {
                error!(
                    target: LOG_TARGET,
                    target_type = self.target.name(),
                    bytes = raw.len(),
                    error = %err,
                    "deferred message could not be decoded; dropping it"
                );
                self.emitter.emit(DispatchEvent::Undecodable).await;
                Disposition::Undecodable
            }
        }
    }

    async fn send<Req>(&self, item: &WorkItem<Req>) -> Result<(), TargetError>
    where
        T: DispatchTarget<Req>,
        Req: Sync,
    {
        match item.kind() {
            ResponseKind::Void => self.target.send_void(item.request()).await,
            ResponseKind::Response => {
                self.target.send_with_response(item.request()).await.map(|_| ())
            }
        }
    }

    async fn failed(&self, attempt: u32, class: FailureClass, failures: u64) {
        self.emitter.emit(DispatchEvent::AttemptFailed { attempt, class, failures }).await;
    }

    async fn cancelled(&self, attempts: u32) -> Disposition {
        self.emitter.emit(DispatchEvent::Cancelled { attempts }).await;
        Disposition::Cancelled { attempts }
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder<T> {
    target: T,
    tracker: Option<FailureTracker>,
    config: Option<DynamicConfig<DispatchConfig>>,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
    emitter: Emitter,
}

impl<T> DispatcherBuilder<T> {
    /// Defaults: fresh tracker, default config, uniform jitter, tokio sleeper, no sink.
    pub fn new(target: T) -> Self {
        Self {
            target,
            tracker: None,
            config: None,
            jitter: Jitter::default(),
            sleeper: Arc::new(TokioSleeper),
            emitter: Emitter::default(),
        }
    }

    /// Share an existing tracker (normally the process-wide one).
    pub fn with_tracker(mut self, tracker: FailureTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Use a fixed configuration.
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = Some(DynamicConfig::new(config));
        self
    }

    /// Use a live configuration handle shared with other components.
    pub fn dynamic_config(mut self, config: DynamicConfig<DispatchConfig>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Emit [`DispatchEvent`]s into `sink`.
    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: DispatchSink,
        S::Future: Send + 'static,
    {
        self.emitter = Emitter::from_sink(sink);
        self
    }

    pub fn build(self) -> Dispatcher<T> {
        Dispatcher {
            target: Arc::new(self.target),
            tracker: self.tracker.unwrap_or_default(),
            config: self.config.unwrap_or_default(),
            jitter: self.jitter,
            sleeper: self.sleeper,
            emitter: self.emitter,
        }
    }
}
