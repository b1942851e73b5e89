//! Parallel suites - overlapping execution for hierarchical test suites
//!
//! Sibling suites, and the tests inside a suite, run concurrently while
//! keeping sequential semantics for ordering, hook composition, `only`/
//! `skip` filtering and failure attribution.
//!
//! ```no_run
//! use parallel_suites::{Callback, RunConfig, Scheduler, Suite, Test};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let root = Suite::root().child(
//!     Suite::new("delays").test(Test::new(
//!         "waits",
//!         Callback::future(|_| async {
//!             tokio::time::sleep(Duration::from_millis(500)).await;
//!             Ok(())
//!         }),
//!     )),
//! );
//! let summary = Scheduler::new(RunConfig::default()).run(root).await;
//! assert!(summary.is_success());
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod demos;
pub mod events;
pub mod execution;
pub mod executor;
pub mod models;
pub mod output;
pub mod utils;

pub use config::RunConfig;
pub use events::{Emitter, Event, EventLog, Reporter, StreamReporter};
pub use execution::{spawn, RunnableContext, Skipped};
pub use executor::{RunPlan, Scheduler};
pub use models::{Callback, Done, Failure, FailureKind, RunSummary, Suite, Test};
