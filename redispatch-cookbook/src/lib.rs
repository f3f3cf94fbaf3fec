//! Ready-to-use redelivery recipes ("cookbook") for redispatch.
//!
//! - Configs: [`patient`], [`impatient`]
//! - Worker: [`run_channel_worker`] drains a channel of raw deferred messages,
//!   redelivers each on its own task, and reports how they ended.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use redispatch::{
    BuildError, CancellationToken, DispatchConfig, DispatchTarget, Dispatcher, Disposition,
    EnvelopeDecoder, EscalatingBackoff,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Tolerates long upstream outages: 6 attempts, 2s units, 30s cap.
pub fn patient() -> Result<DispatchConfig, BuildError> {
    let backoff = EscalatingBackoff::with_unit(Duration::from_secs(2))?.cap(15)?;
    DispatchConfig::builder().max_attempts(6).backoff(backoff).build()
}

/// For interactive paths: 2 attempts, 100ms units, benign lag abandoned after the first miss.
pub fn impatient() -> Result<DispatchConfig, BuildError> {
    let backoff = EscalatingBackoff::with_unit(Duration::from_millis(100))?;
    DispatchConfig::builder().max_attempts(2).benign_attempt_limit(1).backoff(backoff).build()
}

/// Tally of how a worker's items ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub delivered: usize,
    pub abandoned: usize,
    pub exhausted: usize,
    pub cancelled: usize,
    pub undecodable: usize,
    /// Tasks that panicked.
    pub lost: usize,
}

impl WorkerReport {
    pub fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Delivered { .. } => self.delivered += 1,
            Disposition::Abandoned { .. } => self.abandoned += 1,
            Disposition::Exhausted { .. } => self.exhausted += 1,
            Disposition::Cancelled { .. } => self.cancelled += 1,
            Disposition::Undecodable => self.undecodable += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.delivered + self.abandoned + self.exhausted + self.cancelled + self.undecodable + self.lost
    }
}

/// Redeliver every raw message received on `messages` until the channel closes
/// or `cancel` fires, then wait for in-flight items and report.
///
/// Each message gets its own task; all of them share the dispatcher's tracker.
pub async fn run_channel_worker<T, Req, D>(
    dispatcher: Dispatcher<T>,
    decoder: D,
    mut messages: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) -> WorkerReport
where
    T: DispatchTarget<Req> + 'static,
    Req: fmt::Debug + Send + Sync + 'static,
    D: EnvelopeDecoder<Req> + 'static,
{
    let decoder = Arc::new(decoder);
    let mut tasks = JoinSet::new();

    loop {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            raw = messages.recv() => match raw {
                Some(raw) => raw,
                None => break,
            },
        };
        let dispatcher = dispatcher.clone();
        let decoder = decoder.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            dispatcher.dispatch_raw_with_cancel(decoder.as_ref(), &raw, &cancel).await
        });
    }

    let mut report = WorkerReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(disposition) => report.record(disposition),
            Err(err) => {
                tracing::error!(target: "redispatch::worker", error = %err, "redelivery task failed");
                report.lost += 1;
            }
        }
    }
    tracing::info!(
        target: "redispatch::worker",
        delivered = report.delivered,
        dropped = report.total() - report.delivered,
        "worker drained"
    );
    report
}
