//! Data models for suite scheduling
//!
//! Suite trees, failures and run outcomes shared by the scheduler and the
//! reporters.

mod failure;
mod outcome;
mod suite;

pub use failure::{Failure, FailureKind, SourceLocation};
pub use outcome::{
    LateFailure, RunSummary, SuiteFailure, TestId, TestOutcome, TestState, TransitionError,
};
pub use suite::{
    Callback, CallbackFuture, Done, Hook, HookKind, HookScope, Suite, SuiteFlags, Test,
};
