#![allow(dead_code)]

use async_trait::async_trait;
use redispatch::{DispatchTarget, TargetError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

pub const NOT_FOUND: &str = "Contact 42 was not found or you do not have access to the record";

/// What the scripted target does on one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ok,
    NotFound,
    Fail,
    /// Never completes.
    Hang,
}

/// Target that replays a fixed script of outcomes; once the script runs out
/// every send fails generically.
#[derive(Debug, Default)]
pub struct ScriptedTarget {
    steps: Mutex<VecDeque<Step>>,
    void_calls: AtomicUsize,
    response_calls: AtomicUsize,
}

impl ScriptedTarget {
    pub fn new(steps: &[Step]) -> Self {
        Self { steps: Mutex::new(steps.iter().copied().collect()), ..Default::default() }
    }

    pub fn always(step: Step, times: usize) -> Self {
        Self::new(&vec![step; times])
    }

    pub fn void_calls(&self) -> usize {
        self.void_calls.load(Ordering::SeqCst)
    }

    pub fn response_calls(&self) -> usize {
        self.response_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.void_calls() + self.response_calls()
    }

    async fn play(&self) -> Result<(), TargetError> {
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Fail);
        match step {
            Step::Ok => Ok(()),
            Step::NotFound => Err(NOT_FOUND.into()),
            Step::Fail => Err("connection reset by peer".into()),
            Step::Hang => futures::future::pending().await,
        }
    }
}

#[async_trait]
impl<Req> DispatchTarget<Req> for ScriptedTarget
where
    Req: Send + Sync,
{
    type Response = ();

    async fn send_void(&self, _request: &Req) -> Result<(), TargetError> {
        self.void_calls.fetch_add(1, Ordering::SeqCst);
        self.play().await
    }

    async fn send_with_response(&self, _request: &Req) -> Result<(), TargetError> {
        self.response_calls.fetch_add(1, Ordering::SeqCst);
        self.play().await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Log lines captured on the current thread while the guard is alive.
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

impl CapturedLogs {
    pub fn text(&self) -> String {
        String::from_utf8(self.buffer.lock().unwrap().clone()).unwrap()
    }

    /// Lines logged at `level` ("WARN", "ERROR", ...), in order.
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.text()
            .lines()
            .filter(|line| line.trim_start().starts_with(level))
            .map(str::to_owned)
            .collect()
    }

    pub fn count_level(&self, level: &str) -> usize {
        self.lines_at(level).len()
    }

    pub fn warnings(&self) -> usize {
        self.count_level("WARN")
    }

    pub fn errors(&self) -> usize {
        self.count_level("ERROR")
    }
}

/// Asserts `line` carries the structured fields every failure record has.
pub fn assert_failure_fields(line: &str, target_type: &str, attempt: u32, failures: u64) {
    assert!(line.contains(&format!("target_type=\"{target_type}\"")), "missing target_type: {line}");
    assert!(line.contains(&format!(" attempt={attempt} ")), "missing attempt={attempt}: {line}");
    assert!(line.contains(&format!(" failures={failures} ")), "missing failures={failures}: {line}");
}

pub fn capture_logs() -> CapturedLogs {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(true)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    CapturedLogs { buffer, _guard: guard }
}
