//! Failure models
//!
//! Every way a hook or test can go wrong is reduced to a [`Failure`] value
//! before it reaches the event stream.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Where a failure was raised
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn from_location(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Location of the caller of a `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Failure taxonomy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A check inside a callback failed (Rust assertions panic)
    Assertion,
    /// A callback returned an error
    Error,
    /// Tagged background work failed outside the callback's call chain
    Uncaught,
    /// The deadline elapsed before the callback signaled completion
    Timeout,
    /// A lifecycle hook failed, aborting its scope
    Hook,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Assertion => "AssertionError",
            FailureKind::Error => "Error",
            FailureKind::Uncaught => "Uncaught Error",
            FailureKind::Timeout => "Error",
            FailureKind::Hook => "Error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A failure attributed to one hook or test
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// An error failure located at the caller
    ///
    /// Callbacks that return `Err(Failure::here(..).into())` keep their
    /// `file:line` in the report.
    #[track_caller]
    pub fn here(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Error, message).at(SourceLocation::caller())
    }

    pub fn timeout(limit_ms: u64) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("timeout of {limit_ms}ms exceeded. Ensure the test signals completion."),
        )
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.kind = kind;
        self
    }

    /// Wrap this failure as the cause of a hook failure
    pub fn in_hook(self, hook: &str, runnable: &str) -> Self {
        Self {
            kind: FailureKind::Hook,
            message: format!("\"{hook}\" hook for \"{runnable}\": {}", self),
            location: self.location,
        }
    }

    /// Convert an error returned by a callback
    ///
    /// Errors that already are a [`Failure`] keep their kind and location.
    pub fn from_error(error: anyhow::Error, kind: FailureKind) -> Self {
        match error.downcast::<Failure>() {
            Ok(failure) => failure,
            Err(error) => Self::new(kind, format!("{error:#}")),
        }
    }

    /// Convert a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>, location: Option<SourceLocation>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            kind: FailureKind::Assertion,
            message,
            location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let failure = Failure::timeout(2000);
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.message.contains("timeout of 2000ms exceeded"));
    }

    #[test]
    fn test_here_records_location() {
        let failure = Failure::here("Expected error");
        let location = failure.location.as_ref().expect("location");
        assert!(location.file.ends_with("failure.rs"));
        assert_eq!(failure.to_string(), "Error: Expected error");
    }

    #[test]
    fn test_from_error_keeps_failure() {
        let original = Failure::here("boom");
        let converted = Failure::from_error(original.clone().into(), FailureKind::Uncaught);
        assert_eq!(converted, original);

        let plain = Failure::from_error(anyhow::anyhow!("plain"), FailureKind::Uncaught);
        assert_eq!(plain.kind, FailureKind::Uncaught);
        assert_eq!(plain.message, "plain");
    }

    #[test]
    fn test_in_hook_prefix() {
        let failure = Failure::new(FailureKind::Error, "bad setup").in_hook("before each", "test1");
        assert_eq!(failure.kind, FailureKind::Hook);
        assert_eq!(
            failure.message,
            "\"before each\" hook for \"test1\": Error: bad setup"
        );
    }

    #[test]
    fn test_from_panic_payloads() {
        let failure = Failure::from_panic(Box::new("static"), None);
        assert_eq!(failure.message, "static");
        let failure = Failure::from_panic(Box::new(String::from("owned")), None);
        assert_eq!(failure.message, "owned");
        assert_eq!(failure.kind, FailureKind::Assertion);
    }
}
