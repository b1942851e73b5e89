//! Execution primitives
//!
//! Context tracking, failure capture and deadline supervision for a single
//! runnable. The scheduler composes these per hook and per test.

pub mod context;
mod panic;
mod runnable;
mod timeout;

pub use context::{
    current, enter, spawn, Attribution, ContextGuard, ContextId, ContextOwner, ContextRegistry,
    ExecutionContext, FailureInbox, Settlement,
};
pub use panic::{catch_failure, install_hook, take_location};
pub use runnable::{RunnableContext, Skipped};
pub use timeout::{RunnableControl, Supervised, TimeoutController};
