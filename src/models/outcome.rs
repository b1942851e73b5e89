//! Outcome models
//!
//! Test identities, monotonic test state and the run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::failure::Failure;

/// Identity of a test within the tree
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestId {
    /// Authorial position of the test in the run plan
    pub ordinal: usize,
    /// Titles of the enclosing suites, root first (root is untitled)
    pub suite: Vec<String>,
    pub title: String,
}

impl TestId {
    /// Suite titles joined with spaces
    pub fn suite_label(&self) -> String {
        self.suite
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Suite titles and test title joined with spaces
    pub fn full_title(&self) -> String {
        let label = self.suite_label();
        if label.is_empty() {
            self.title.clone()
        } else {
            format!("{label} {}", self.title)
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_title())
    }
}

/// Per-test state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

/// Rejected state change
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid test state transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: TestState,
    pub to: TestState,
}

impl TestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestState::Passed | TestState::Failed | TestState::Skipped)
    }

    /// Move forward: pending -> running -> terminal, or pending -> skipped
    pub fn advance(self, to: TestState) -> Result<TestState, TransitionError> {
        let allowed = match (self, to) {
            (TestState::Pending, TestState::Running) => true,
            (TestState::Pending, TestState::Skipped) => true,
            (TestState::Running, next) => next.is_terminal(),
            _ => false,
        };
        if allowed {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TestState::Passed => "✓",
            TestState::Failed => "✗",
            TestState::Skipped => "-",
            TestState::Pending | TestState::Running => " ",
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestState::Pending => write!(f, "PENDING"),
            TestState::Running => write!(f, "RUNNING"),
            TestState::Passed => write!(f, "PASS"),
            TestState::Failed => write!(f, "FAIL"),
            TestState::Skipped => write!(f, "SKIP"),
        }
    }
}

/// Terminal record of one test
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test: TestId,
    pub state: TestState,
    pub duration_ms: u64,
    pub slow: bool,
    pub failure: Option<Failure>,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.state.symbol(),
            self.test,
            self.duration_ms
        )?;
        if let Some(failure) = &self.failure {
            write!(f, " - {failure}")?;
        }
        Ok(())
    }
}

/// A failure reported against a suite rather than one test
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteFailure {
    pub suite: Vec<String>,
    pub failure: Failure,
}

impl SuiteFailure {
    pub fn suite_label(&self) -> String {
        self.suite
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A failure that arrived after its test had already passed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LateFailure {
    pub test: TestId,
    pub failure: Failure,
}

/// Summary of a whole run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub parallel: bool,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub duration_ms: u64,
    /// Outcomes in completion order
    pub results: Vec<TestOutcome>,
    pub suite_failures: Vec<SuiteFailure>,
    pub late_failures: Vec<LateFailure>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, parallel: bool) -> Self {
        Self {
            started_at,
            parallel,
            total: 0,
            passed: 0,
            failed: 0,
            pending: 0,
            duration_ms: 0,
            results: Vec::new(),
            suite_failures: Vec::new(),
            late_failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: TestOutcome) {
        self.total += 1;
        match outcome.state {
            TestState::Passed => self.passed += 1,
            TestState::Failed => self.failed += 1,
            TestState::Skipped => self.pending += 1,
            TestState::Pending | TestState::Running => {}
        }
        self.results.push(outcome);
    }

    /// Number of failures to print (tests, suites and late failures)
    pub fn failing(&self) -> usize {
        self.failed + self.suite_failures.len() + self.late_failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failing() == 0
    }

    /// Outcomes in authorial order
    pub fn ordered(&self) -> Vec<&TestOutcome> {
        let mut ordered: Vec<_> = self.results.iter().collect();
        ordered.sort_by_key(|o| o.test.ordinal);
        ordered
    }

    pub fn outcome(&self, title: &str) -> Option<&TestOutcome> {
        self.results.iter().find(|o| o.test.title == title)
    }

    pub fn pass_rate(&self) -> f64 {
        let ran = self.passed + self.failed;
        if ran == 0 {
            0.0
        } else {
            (self.passed as f64 / ran as f64) * 100.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in self.ordered() {
            writeln!(f, "  {result}")?;
        }
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Pending: {}",
            self.total,
            self.passed,
            self.failing(),
            self.pending
        )?;
        writeln!(f, "Duration: {}ms", self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Failure, FailureKind};

    fn id(ordinal: usize, title: &str) -> TestId {
        TestId {
            ordinal,
            suite: vec![String::new(), "suite".to_string()],
            title: title.to_string(),
        }
    }

    fn outcome(ordinal: usize, title: &str, state: TestState) -> TestOutcome {
        TestOutcome {
            test: id(ordinal, title),
            state,
            duration_ms: 10,
            slow: false,
            failure: None,
        }
    }

    #[test]
    fn test_full_title_skips_untitled_root() {
        assert_eq!(id(0, "test2").full_title(), "suite test2");
        assert_eq!(id(0, "test2").suite_label(), "suite");
    }

    #[test]
    fn test_state_transitions_are_monotonic() {
        let running = TestState::Pending.advance(TestState::Running).unwrap();
        let passed = running.advance(TestState::Passed).unwrap();
        assert!(passed.advance(TestState::Failed).is_err());
        assert!(passed.advance(TestState::Running).is_err());
        assert_eq!(
            TestState::Pending.advance(TestState::Skipped),
            Ok(TestState::Skipped)
        );
        assert_eq!(
            TestState::Pending.advance(TestState::Passed),
            Err(TransitionError {
                from: TestState::Pending,
                to: TestState::Passed
            })
        );
    }

    #[test]
    fn test_summary_counts() {
        let started = Utc::now();
        let mut summary = RunSummary::new(started, true);
        summary.record(outcome(2, "c", TestState::Skipped));
        summary.record(outcome(0, "a", TestState::Passed));
        summary.record(outcome(1, "b", TestState::Failed));

        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 1);
        assert!(!summary.is_success());

        let titles: Vec<_> = summary.ordered().iter().map(|o| o.test.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_late_failure_fails_run() {
        let mut summary = RunSummary::new(Utc::now(), true);
        summary.record(outcome(0, "a", TestState::Passed));
        assert!(summary.is_success());
        summary.late_failures.push(LateFailure {
            test: id(0, "a"),
            failure: Failure::new(FailureKind::Uncaught, "late"),
        });
        assert_eq!(summary.failing(), 1);
        assert!(!summary.is_success());
    }
}
