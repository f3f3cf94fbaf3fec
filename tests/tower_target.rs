use redispatch::{
    Dispatcher, Disposition, FailureTracker, InstantSleeper, ServiceTarget, TrackingSleeper,
    WorkItem,
};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::service_fn;

/// Handler error that wraps the store's own error.
#[derive(Debug)]
struct HandlerError {
    source: std::io::Error,
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler failed")
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn missing_record() -> HandlerError {
    HandlerError {
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Record was not found or you do not have access to it",
        ),
    }
}

#[tokio::test]
async fn wrapped_not_found_is_benign() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let svc = service_fn(move |_id: u64| {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(missing_record()) }
    });
    let tracker = FailureTracker::new();
    let dispatcher = Dispatcher::builder(ServiceTarget::new(svc).named("contacts"))
        .with_tracker(tracker.clone())
        .with_sleeper(InstantSleeper)
        .build();

    let outcome = dispatcher.dispatch(WorkItem::void(42u64)).await;

    assert_eq!(outcome, Disposition::Abandoned { attempts: 3 });
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(tracker.current(), 0);
}

#[tokio::test]
async fn flaky_service_recovers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let svc = service_fn(move |order: String| {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "upstream reset"))
            } else {
                Ok(format!("{order} saved"))
            }
        }
    });
    let sleeper = TrackingSleeper::new();
    let tracker = FailureTracker::new();
    let dispatcher = Dispatcher::builder(ServiceTarget::new(svc))
        .with_tracker(tracker.clone())
        .with_sleeper(sleeper.clone())
        .build();

    let outcome = dispatcher.dispatch(WorkItem::expecting_response("order-7".to_string())).await;

    assert_eq!(outcome, Disposition::Delivered { attempts: 3 });
    assert_eq!(sleeper.count(), 2);
    assert_eq!(tracker.current(), 0);
}
