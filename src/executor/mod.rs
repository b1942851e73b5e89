//! Suite execution engine
//!
//! Plans a suite tree, composes hook chains and schedules suites, tests and
//! hooks with overlapping execution.

mod hooks;
mod plan;
mod scheduler;

pub use hooks::{compose, ComposedHook, ComposedHooks};
pub use plan::{PlannedSuite, PlannedTest, RunPlan};
pub use scheduler::Scheduler;
