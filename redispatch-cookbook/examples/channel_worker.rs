//! A worker draining a channel of deferred "sync contact" messages into a
//! flaky handler, with telemetry printed at the end.

use redispatch::prelude::*;
use redispatch::DecodeError;
use redispatch_cookbook::{impatient, run_channel_worker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

fn decode(raw: &[u8]) -> Result<WorkItem<String>, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    match text.split_once(':') {
        Some(("sync", contact)) => Ok(WorkItem::void(contact.to_string()).with_label("contacts")),
        _ => Err(DecodeError::Malformed(format!("unknown message {text:?}"))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== redispatch: channel worker ===\n");

    // Every third call hits a generic failure; "ghost" contacts never appear.
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let handler = tower::service_fn(move |contact: String| {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if contact == "ghost" {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Record was not found or you do not have access to it",
                ));
            }
            if n % 3 == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "crm timed out"));
            }
            Ok(())
        }
    });

    let sink = MemorySink::new();
    let dispatcher = Dispatcher::builder(ServiceTarget::new(handler).named("crm"))
        .config(impatient()?)
        .with_sink(sink.clone())
        .build();
    let tracker = dispatcher.tracker().clone();

    let (tx, rx) = mpsc::channel(16);
    let worker = tokio::spawn(run_channel_worker::<_, String, _>(
        dispatcher,
        decode,
        rx,
        CancellationToken::new(),
    ));

    for message in ["sync:alice", "sync:bob", "sync:ghost", "delete:carol", "sync:dave"] {
        tx.send(message.as_bytes().to_vec()).await?;
    }
    drop(tx);

    let report = worker.await?;
    println!("Report: {:?}", report);
    println!("Shared failure count now: {}", tracker.current());

    println!("\nTelemetry events (MemorySink):");
    for event in sink.events() {
        println!("  - {}", event);
    }

    Ok(())
}
