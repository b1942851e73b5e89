//! Output formatters for run summaries
//!
//! Provides a spec-style tree, JSON, CSV and one-line summary output.

use serde::Serialize;
use std::io::Write;
use tracing::warn;

use crate::models::{Failure, RunSummary, TestOutcome, TestState};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Spec,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "spec" | "tree" => Some(OutputFormat::Spec),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }

    /// Whether the format is machine-readable
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            OutputFormat::Json | OutputFormat::JsonPretty | OutputFormat::Csv
        )
    }
}

/// Summary formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const GREY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

/// One CSV row per test
#[derive(Serialize)]
struct CsvRow<'a> {
    ordinal: usize,
    suite: String,
    title: &'a str,
    state: String,
    duration_ms: u64,
    slow: bool,
    failure_kind: &'a str,
    message: &'a str,
    location: String,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colorize {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    /// Format a finished run
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Spec => self.format_spec(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Csv => self.format_csv(summary).unwrap_or_else(|e| {
                warn!("Failed to format CSV output: {}", e);
                String::new()
            }),
            OutputFormat::Summary => self.format_brief(summary),
        }
    }

    fn format_spec(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        let mut open: Vec<String> = Vec::new();
        let mut failure_no = 0;

        for outcome in summary.ordered() {
            let path: Vec<String> = outcome
                .test
                .suite
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect();

            // print headers for the suites this test enters
            let shared = open
                .iter()
                .zip(&path)
                .take_while(|(a, b)| a == b)
                .count();
            for (depth, title) in path.iter().enumerate().skip(shared) {
                output.push('\n');
                output.push_str(&format!("{}{}\n", indent(depth + 1), title));
            }
            open = path;

            let pad = indent(open.len() + 1);
            match outcome.state {
                TestState::Failed => {
                    failure_no += 1;
                    let line = format!("{failure_no}) {}", outcome.test.title);
                    output.push_str(&format!("{pad}{}\n", self.paint(RED, &line)));
                }
                TestState::Skipped => {
                    let line = format!("- {}", outcome.test.title);
                    output.push_str(&format!("{pad}{}\n", self.paint(CYAN, &line)));
                }
                _ => output.push_str(&format!("{pad}{}\n", self.format_pass(outcome))),
            }
        }

        output.push('\n');
        let passing = format!("{} passing", summary.passed);
        output.push_str(&format!(
            "  {} {}\n",
            self.paint(GREEN, &passing),
            self.paint(GREY, &format!("({}ms)", summary.duration_ms))
        ));
        if summary.pending > 0 {
            let pending = format!("{} pending", summary.pending);
            output.push_str(&format!("  {}\n", self.paint(CYAN, &pending)));
        }
        if summary.failing() > 0 {
            let failing = format!("{} failing", summary.failing());
            output.push_str(&format!("  {}\n", self.paint(RED, &failing)));
        }

        let mut number = 0;
        for outcome in summary.ordered() {
            if let Some(failure) = &outcome.failure {
                number += 1;
                output.push_str(&self.format_failure(number, &outcome.test.full_title(), failure));
            }
        }
        for suite_failure in &summary.suite_failures {
            number += 1;
            output.push_str(&self.format_failure(
                number,
                &suite_failure.suite_label(),
                &suite_failure.failure,
            ));
        }
        for late in &summary.late_failures {
            number += 1;
            let title = format!("{} (after passing)", late.test.full_title());
            output.push_str(&self.format_failure(number, &title, &late.failure));
        }

        output
    }

    fn format_pass(&self, outcome: &TestOutcome) -> String {
        let check = self.paint(GREEN, "✓");
        let title = self.paint(GREY, &outcome.test.title);
        if outcome.slow {
            let duration = format!("({}ms)", outcome.duration_ms);
            format!("{check} {title} {}", self.paint(YELLOW, &duration))
        } else {
            format!("{check} {title}")
        }
    }

    fn format_failure(&self, number: usize, title: &str, failure: &Failure) -> String {
        let mut output = format!("\n  {number}) {title}:\n");
        let message = format!("{}: {}", failure.kind, failure.message);
        for line in message.lines() {
            output.push_str(&format!("     {}\n", self.paint(RED, line)));
        }
        if let Some(location) = &failure.location {
            output.push_str(&format!("      {}\n", self.paint(GREY, &format!("at {location}"))));
        }
        output
    }

    fn format_csv(&self, summary: &RunSummary) -> anyhow::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for outcome in summary.ordered() {
            let failure = outcome.failure.as_ref();
            writer.serialize(CsvRow {
                ordinal: outcome.test.ordinal,
                suite: outcome.test.suite_label(),
                title: &outcome.test.title,
                state: outcome.state.to_string(),
                duration_ms: outcome.duration_ms,
                slow: outcome.slow,
                failure_kind: failure.map(|f| f.kind.label()).unwrap_or(""),
                message: failure.map(|f| f.message.as_str()).unwrap_or(""),
                location: failure
                    .and_then(|f| f.location.as_ref())
                    .map(|l| l.to_string())
                    .unwrap_or_default(),
            })?;
        }
        let bytes = writer.into_inner()?;
        Ok(String::from_utf8(bytes)?)
    }

    fn format_brief(&self, summary: &RunSummary) -> String {
        format!(
            "{} mode: {}/{} passing, {} failing, {} pending ({:.1}%) in {}ms",
            if summary.parallel { "Parallel" } else { "Serial" },
            summary.passed,
            summary.total,
            summary.failing(),
            summary.pending,
            summary.pass_rate(),
            summary.duration_ms
        )
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Spec)
    }
}

/// Write a formatted summary to a file
pub fn write_summary_to_file(
    path: &str,
    summary: &RunSummary,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
