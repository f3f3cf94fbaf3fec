use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::Ready;
use redispatch::{
    Classifier, Dispatcher, FailureTracker, InstantSleeper, Jitter, ServiceTarget, WorkItem,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::Service;

// Accepts every request immediately.
#[derive(Clone)]
struct AcceptService;

impl Service<u64> for AcceptService {
    type Response = ();
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: u64) -> Self::Future {
        futures::future::ready(Ok(()))
    }
}

// Fails once per request pair, so every dispatch takes one retry.
#[derive(Clone)]
struct FlakyService {
    calls: Arc<AtomicUsize>,
}

impl Service<u64> for FlakyService {
    type Response = ();
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: u64) -> Self::Future {
        if self.calls.fetch_add(1, Ordering::Relaxed) % 2 == 0 {
            futures::future::ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
        } else {
            futures::future::ready(Ok(()))
        }
    }
}

fn tracker_ops(c: &mut Criterion) {
    let tracker = FailureTracker::new();
    c.bench_function("tracker_increment_then_reset", |b| {
        b.iter(|| {
            black_box(tracker.increment());
            black_box(tracker.reset());
        });
    });
}

fn classification(c: &mut Criterion) {
    let classifier = Classifier::default();
    let benign = std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "Record was not found or you do not have access to it",
    );
    let generic = std::io::Error::new(std::io::ErrorKind::Other, "connection reset by peer");
    c.bench_function("classify_benign_and_generic", |b| {
        b.iter(|| {
            black_box(classifier.classify(black_box(&benign)));
            black_box(classifier.classify(black_box(&generic)));
        });
    });
}

fn dispatch_success_path(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dispatcher = Dispatcher::builder(ServiceTarget::new(AcceptService))
        .with_sleeper(InstantSleeper)
        .build();

    c.bench_function("dispatch_first_attempt_success", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(dispatcher.dispatch(WorkItem::void(black_box(7u64))).await);
        });
    });
}

fn dispatch_one_retry(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let svc = FlakyService { calls: Arc::new(AtomicUsize::new(0)) };
    let dispatcher = Dispatcher::builder(ServiceTarget::new(svc))
        .with_sleeper(InstantSleeper)
        .with_jitter(Jitter::seeded(7))
        .build();

    c.bench_function("dispatch_generic_failure_then_success", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(dispatcher.dispatch(WorkItem::void(black_box(7u64))).await);
        });
    });
}

criterion_group!(benches, tracker_ops, classification, dispatch_success_path, dispatch_one_retry);
criterion_main!(benches);
