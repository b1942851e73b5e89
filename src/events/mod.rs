//! Lifecycle events
//!
//! The scheduler emits [`Event`]s as they happen. Events of one suite are
//! in order; events of concurrently running suites interleave freely, so
//! every sink here is append-only and order-tolerant.

mod aggregator;

pub use aggregator::Aggregator;

use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tracing::warn;

use crate::models::{Failure, TestId};

/// A lifecycle event
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    RunStart {
        total: usize,
        parallel: bool,
    },
    SuiteStart {
        suite: Vec<String>,
    },
    TestStart {
        test: TestId,
    },
    TestPass {
        test: TestId,
        duration_ms: u64,
        slow: bool,
    },
    TestFail {
        test: TestId,
        duration_ms: u64,
        failure: Failure,
    },
    TestPending {
        test: TestId,
    },
    SuiteFail {
        suite: Vec<String>,
        failure: Failure,
    },
    SuiteEnd {
        suite: Vec<String>,
    },
    LateFailure {
        test: TestId,
        failure: Failure,
    },
    RunEnd {
        duration_ms: u64,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RunStart { .. } => "run-start",
            Event::SuiteStart { .. } => "suite-start",
            Event::TestStart { .. } => "test-start",
            Event::TestPass { .. } => "test-pass",
            Event::TestFail { .. } => "test-fail",
            Event::TestPending { .. } => "test-pending",
            Event::SuiteFail { .. } => "suite-fail",
            Event::SuiteEnd { .. } => "suite-end",
            Event::LateFailure { .. } => "late-failure",
            Event::RunEnd { .. } => "run-end",
        }
    }

    /// The test this event concerns, if any
    pub fn test(&self) -> Option<&TestId> {
        match self {
            Event::TestStart { test }
            | Event::TestPass { test, .. }
            | Event::TestFail { test, .. }
            | Event::TestPending { test }
            | Event::LateFailure { test, .. } => Some(test),
            _ => None,
        }
    }
}

/// Consumer of lifecycle events
pub trait Reporter: Send + Sync {
    fn report(&self, event: &Event);
}

/// Fan-out to every registered reporter
#[derive(Clone, Default)]
pub struct Emitter {
    sinks: Arc<Vec<Arc<dyn Reporter>>>,
}

impl Emitter {
    pub fn new(sinks: Vec<Arc<dyn Reporter>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    pub fn emit(&self, event: Event) {
        for sink in self.sinks.iter() {
            sink.report(&event);
        }
    }
}

/// In-memory append-only event log
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Names of all events concerning the test with this title
    pub fn for_test(&self, title: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.test().is_some_and(|t| t.title == title))
            .map(Event::name)
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }
}

impl Reporter for EventLog {
    fn report(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// Writes each event as one JSON line
pub struct StreamReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> StreamReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl StreamReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> Reporter for StreamReporter<W> {
    fn report(&self, event: &Event) {
        let mut out = self.out.lock();
        let written = serde_json::to_writer(&mut *out, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out));
        if let Err(e) = written {
            warn!("failed to write {} event: {}", event.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_id(title: &str) -> TestId {
        TestId {
            ordinal: 0,
            suite: vec!["suite".to_string()],
            title: title.to_string(),
        }
    }

    #[test]
    fn test_emitter_fans_out() {
        let first = Arc::new(EventLog::new());
        let second = Arc::new(EventLog::new());
        let emitter = Emitter::new(vec![first.clone(), second.clone()]);

        emitter.emit(Event::TestStart {
            test: test_id("t1"),
        });

        assert_eq!(first.count("test-start"), 1);
        assert_eq!(second.for_test("t1"), vec!["test-start"]);
    }

    #[test]
    fn test_stream_reporter_writes_ndjson() {
        let reporter = StreamReporter::new(Vec::new());
        reporter.report(&Event::TestPending {
            test: test_id("t1"),
        });
        reporter.report(&Event::RunEnd { duration_ms: 5 });

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "test-pending");
        assert_eq!(first["test"]["title"], "t1");
    }
}
