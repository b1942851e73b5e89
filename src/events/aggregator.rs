//! Summary aggregation from the event stream

use chrono::Utc;
use parking_lot::Mutex;

use super::{Event, Reporter};
use crate::models::{LateFailure, RunSummary, SuiteFailure, TestOutcome, TestState};

/// Builds a [`RunSummary`] from events in whatever order they arrive
pub struct Aggregator {
    summary: Mutex<RunSummary>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            summary: Mutex::new(RunSummary::new(Utc::now(), true)),
        }
    }

    pub fn summary(&self) -> RunSummary {
        self.summary.lock().clone()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for Aggregator {
    fn report(&self, event: &Event) {
        let mut summary = self.summary.lock();
        match event {
            Event::RunStart { parallel, .. } => {
                summary.started_at = Utc::now();
                summary.parallel = *parallel;
            }
            Event::TestPass {
                test,
                duration_ms,
                slow,
            } => summary.record(TestOutcome {
                test: test.clone(),
                state: TestState::Passed,
                duration_ms: *duration_ms,
                slow: *slow,
                failure: None,
            }),
            Event::TestFail {
                test,
                duration_ms,
                failure,
            } => summary.record(TestOutcome {
                test: test.clone(),
                state: TestState::Failed,
                duration_ms: *duration_ms,
                slow: false,
                failure: Some(failure.clone()),
            }),
            Event::TestPending { test } => summary.record(TestOutcome {
                test: test.clone(),
                state: TestState::Skipped,
                duration_ms: 0,
                slow: false,
                failure: None,
            }),
            Event::SuiteFail { suite, failure } => summary.suite_failures.push(SuiteFailure {
                suite: suite.clone(),
                failure: failure.clone(),
            }),
            Event::LateFailure { test, failure } => summary.late_failures.push(LateFailure {
                test: test.clone(),
                failure: failure.clone(),
            }),
            Event::RunEnd { duration_ms } => summary.duration_ms = *duration_ms,
            Event::SuiteStart { .. } | Event::SuiteEnd { .. } | Event::TestStart { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Failure, TestId};

    fn test_id(ordinal: usize, title: &str) -> TestId {
        TestId {
            ordinal,
            suite: vec!["suite".to_string()],
            title: title.to_string(),
        }
    }

    #[test]
    fn test_aggregates_terminal_events() {
        let aggregator = Aggregator::new();
        aggregator.report(&Event::RunStart {
            total: 3,
            parallel: false,
        });
        aggregator.report(&Event::TestStart {
            test: test_id(0, "test1"),
        });
        aggregator.report(&Event::TestPass {
            test: test_id(0, "test1"),
            duration_ms: 12,
            slow: false,
        });
        aggregator.report(&Event::TestFail {
            test: test_id(1, "test2"),
            duration_ms: 3,
            failure: Failure::here("Expected error"),
        });
        aggregator.report(&Event::TestPending {
            test: test_id(2, "test3"),
        });
        aggregator.report(&Event::RunEnd { duration_ms: 20 });

        let summary = aggregator.summary();
        assert!(!summary.parallel);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.duration_ms, 20);

        let failed = summary.outcome("test2").unwrap();
        assert_eq!(failed.test.full_title(), "suite test2");
        assert_eq!(
            failed.failure.as_ref().map(|f| f.message.as_str()),
            Some("Expected error")
        );
    }
}
