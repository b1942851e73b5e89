//! Built-in demo suites
//!
//! Small suite trees exercising overlapping execution: delays, hooks,
//! failures, skips, `only`, context overrides and timeouts. The CLI runs
//! them by name.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::models::{Callback, Failure, Suite, Test};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DemoError {
    #[error("Unknown demo '{0}'. Use `list` to see available demos")]
    Unknown(String),
}

/// Expected totals for a demo run on its own
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expected {
    pub passing: usize,
    pub failing: usize,
    pub pending: usize,
}

const fn expect(passing: usize, failing: usize, pending: usize) -> Expected {
    Expected {
        passing,
        failing,
        pending,
    }
}

/// A named demo tree
pub struct Demo {
    pub name: &'static str,
    pub description: &'static str,
    /// Runs with parallelism disabled
    pub serial: bool,
    pub expected: Expected,
    build: fn() -> Vec<Suite>,
}

impl Demo {
    /// Fresh top-level suites for one run
    pub fn suites(&self) -> Vec<Suite> {
        (self.build)()
    }

    /// Whether the demo restricts a run with `only`
    pub fn is_exclusive(&self) -> bool {
        self.suites().iter().any(Suite::contains_only)
    }
}

static DEMOS: &[Demo] = &[
    Demo {
        name: "delay",
        description: "Three 500ms tests in one suite",
        serial: false,
        expected: expect(3, 0, 0),
        build: delay,
    },
    Demo {
        name: "multiple",
        description: "Two suites of two 500ms tests each",
        serial: false,
        expected: expect(4, 0, 0),
        build: multiple,
    },
    Demo {
        name: "sync",
        description: "Synchronous hooks and tests",
        serial: false,
        expected: expect(3, 0, 0),
        build: sync,
    },
    Demo {
        name: "hooks",
        description: "All four hook kinds around two tests",
        serial: false,
        expected: expect(2, 0, 0),
        build: hooks,
    },
    Demo {
        name: "parent-hooks",
        description: "Ancestor before-each hooks, outermost first per test; tests interleave",
        serial: false,
        expected: expect(2, 0, 0),
        build: parent_hooks,
    },
    Demo {
        name: "hooks-example",
        description: "Slow before-each hook shared by two slow tests",
        serial: false,
        expected: expect(2, 0, 0),
        build: hooks_example,
    },
    Demo {
        name: "failure",
        description: "A test returning an error between two passing tests",
        serial: false,
        expected: expect(2, 1, 0),
        build: failure,
    },
    Demo {
        name: "assertion-failure",
        description: "An assertion failing after an await",
        serial: false,
        expected: expect(2, 1, 0),
        build: assertion_failure,
    },
    Demo {
        name: "uncaught",
        description: "Background work panicking while sibling tests run",
        serial: false,
        expected: expect(2, 1, 0),
        build: uncaught,
    },
    Demo {
        name: "skip",
        description: "A test declared skipped",
        serial: false,
        expected: expect(2, 0, 1),
        build: skip,
    },
    Demo {
        name: "parallel-skip",
        description: "A skipped suite next to a running one",
        serial: false,
        expected: expect(3, 0, 1),
        build: parallel_skip,
    },
    Demo {
        name: "only",
        description: "One test selected with only",
        serial: false,
        expected: expect(1, 0, 0),
        build: only,
    },
    Demo {
        name: "parallel-only",
        description: "One suite selected with only",
        serial: false,
        expected: expect(3, 0, 0),
        build: parallel_only,
    },
    Demo {
        name: "context-skip",
        description: "A test skipping itself while running",
        serial: false,
        expected: expect(2, 0, 1),
        build: context_skip,
    },
    Demo {
        name: "context-timeout",
        description: "A test lowering its own timeout",
        serial: false,
        expected: expect(2, 1, 0),
        build: context_timeout,
    },
    Demo {
        name: "disable",
        description: "Two 500ms tests with parallelism disabled",
        serial: true,
        expected: expect(2, 0, 0),
        build: disable,
    },
    Demo {
        name: "context-proxy",
        description: "Suite and test level timeout, slow and skip",
        serial: false,
        expected: expect(2, 1, 1),
        build: context_proxy,
    },
    Demo {
        name: "default-timeout",
        description: "Two tests that never signal completion",
        serial: false,
        expected: expect(0, 2, 0),
        build: default_timeout,
    },
];

/// Every built-in demo
pub fn all() -> &'static [Demo] {
    DEMOS
}

pub fn find(name: &str) -> Result<&'static Demo, DemoError> {
    DEMOS
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| DemoError::Unknown(name.to_string()))
}

/// Resolve demo names; no names selects every demo that can share a run
pub fn select(names: &[String]) -> Result<Vec<&'static Demo>, DemoError> {
    if names.is_empty() {
        return Ok(DEMOS
            .iter()
            .filter(|d| !d.serial && !d.is_exclusive())
            .collect());
    }
    names.iter().map(|name| find(name)).collect()
}

/// One root holding the top-level suites of every selected demo
pub fn root(demos: &[&Demo]) -> Suite {
    demos
        .iter()
        .flat_map(|d| d.suites())
        .fold(Suite::root(), Suite::child)
}

fn pause(ms: u64) -> Callback {
    Callback::future(move |_| async move {
        sleep(Duration::from_millis(ms)).await;
        Ok(())
    })
}

fn delayed(title: &str, ms: u64) -> Test {
    Test::new(title, pause(ms))
}

fn passing(title: &str) -> Test {
    Test::new(title, Callback::sync(|_| Ok(())))
}

fn delay() -> Vec<Suite> {
    vec![Suite::new("delays")
        .test(delayed("test1", 500))
        .test(delayed("test2", 500))
        .test(delayed("test3", 500))]
}

fn multiple() -> Vec<Suite> {
    vec![
        Suite::new("suite1")
            .test(delayed("test1", 500))
            .test(delayed("test2", 500)),
        Suite::new("suite2")
            .test(delayed("test1", 500))
            .test(delayed("test2", 500)),
    ]
}

fn sync() -> Vec<Suite> {
    let counter = Arc::new(Mutex::new(0usize));
    let before = Arc::clone(&counter);
    vec![Suite::new("sync")
        .before_each(Callback::sync(move |_| {
            *before.lock() += 1;
            Ok(())
        }))
        .test(passing("test1"))
        .test(passing("test2"))
        .test(Test::new(
            "test3",
            Callback::sync(move |_| {
                anyhow::ensure!(*counter.lock() >= 1, "before each did not run");
                Ok(())
            }),
        ))]
}

fn hooks() -> Vec<Suite> {
    vec![Suite::new("hooks")
        .before_all(pause(100))
        .before_each(pause(100))
        .after_each(pause(100))
        .after_all(pause(100))
        .test(delayed("test1", 500))
        .test(delayed("test2", 500))]
}

/// Each test sees suiteA, suiteB, child in that order, but the two tests'
/// lines overlap, so the printed log interleaves them by timing.
fn parent_hooks() -> Vec<Suite> {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let record = |name: &'static str| {
        let calls = Arc::clone(&calls);
        Callback::future(move |_| {
            let calls = Arc::clone(&calls);
            async move {
                calls.lock().push(name);
                sleep(Duration::from_millis(100)).await;
                Ok(())
            }
        })
    };
    let report = {
        let calls = Arc::clone(&calls);
        Callback::sync(move |_| {
            println!("{}", calls.lock().join(", "));
            Ok(())
        })
    };

    vec![Suite::new("suiteA")
        .before_each(record("suiteABeforeEach"))
        .after_all(report)
        .child(
            Suite::new("suiteB").before_each(record("suiteBBeforeEach")).child(
                Suite::new("child")
                    .before_each(record("childBeforeEach"))
                    .test(delayed("test1", 500))
                    .test(delayed("test2", 500)),
            ),
        )]
}

fn hooks_example() -> Vec<Suite> {
    vec![Suite::new("setTimeout")
        .before_each(pause(500))
        .test(delayed("test1", 500))
        .test(delayed("test2", 500))]
}

fn failure() -> Vec<Suite> {
    vec![Suite::new("suite")
        .test(delayed("test1", 100))
        .test(Test::new(
            "test2",
            Callback::sync(|_| Err(Failure::here("Expected error").into())),
        ))
        .test(delayed("test3", 100))]
}

fn assertion_failure() -> Vec<Suite> {
    vec![Suite::new("suite")
        .test(delayed("test1", 100))
        .test(Test::new(
            "test2",
            Callback::future(|_| async {
                sleep(Duration::from_millis(50)).await;
                let ready = false;
                assert!(ready, "true == false");
                Ok(())
            }),
        ))
        .test(delayed("test3", 100))]
}

fn uncaught() -> Vec<Suite> {
    vec![Suite::new("uncaught")
        .test(delayed("test1", 500))
        .test(Test::new(
            "test2",
            Callback::with_done(|ctx, _done| {
                ctx.spawn(async {
                    sleep(Duration::from_millis(100)).await;
                    panic!("Uncaught failure from background work");
                });
            }),
        ))
        .test(delayed("test3", 500))]
}

fn skip() -> Vec<Suite> {
    vec![Suite::new("skip")
        .test(delayed("test1", 100))
        .test(delayed("test2", 100).skip())
        .test(delayed("test3", 100))]
}

fn parallel_skip() -> Vec<Suite> {
    let loud = || {
        Callback::sync(|_| {
            println!("should not be printed");
            Ok(())
        })
    };
    vec![
        Suite::new("skipped suite")
            .skip()
            .before_all(loud())
            .test(Test::new("test1", loud())),
        Suite::new("running suite")
            .test(delayed("test1", 100))
            .test(delayed("test2", 100))
            .test(delayed("test3", 100)),
    ]
}

fn only() -> Vec<Suite> {
    vec![Suite::new("only")
        .test(delayed("should not run 1", 100))
        .test(delayed("test2", 100).only())
        .test(delayed("should not run 2", 100))]
}

fn parallel_only() -> Vec<Suite> {
    vec![
        Suite::new("ignored")
            .test(delayed("should not run", 100))
            .test(delayed("should not run either", 100)),
        Suite::new("selected")
            .only()
            .test(delayed("test1", 100))
            .test(delayed("test2", 100))
            .test(delayed("test3", 100)),
    ]
}

fn context_skip() -> Vec<Suite> {
    vec![Suite::new("context skip")
        .test(delayed("test1", 100))
        .test(Test::new(
            "test2",
            Callback::future(|ctx| async move {
                sleep(Duration::from_millis(50)).await;
                Err(ctx.skip().into())
            }),
        ))
        .test(delayed("test3", 100))]
}

fn context_timeout() -> Vec<Suite> {
    vec![Suite::new("parent suite")
        .test(delayed("test1", 500))
        .test(Test::new(
            "test2",
            Callback::future(|ctx| async move {
                ctx.timeout(Duration::from_millis(100));
                sleep(Duration::from_millis(500)).await;
                Ok(())
            }),
        ))
        .test(delayed("test3", 500))]
}

fn disable() -> Vec<Suite> {
    vec![Suite::new("disable")
        .test(delayed("test1", 500))
        .test(delayed("test2", 500))]
}

fn context_proxy() -> Vec<Suite> {
    vec![Suite::new("suite")
        .timeout(Duration::from_millis(100))
        .slow(Duration::from_millis(50))
        .test(delayed("test1", 300))
        .test(Test::new(
            "test2",
            Callback::future(|ctx| async move {
                ctx.timeout(Duration::from_millis(1000));
                sleep(Duration::from_millis(300)).await;
                Ok(())
            }),
        ))
        .test(Test::new(
            "test3",
            Callback::future(|ctx| async move {
                ctx.slow(Duration::from_millis(10));
                sleep(Duration::from_millis(20)).await;
                Ok(())
            }),
        ))
        .test(Test::new(
            "test4",
            Callback::sync(|ctx| Err(ctx.skip().into())),
        ))]
}

fn default_timeout() -> Vec<Suite> {
    vec![Suite::new("suite")
        .test(Test::new("test1", Callback::with_done(|_, _done| {})))
        .test(Test::new("test2", Callback::with_done(|_, _done| {})))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::executor::Scheduler;
    use std::collections::HashSet;
    use tokio::time::Instant;

    async fn run(demo: &Demo) -> crate::models::RunSummary {
        let config = if demo.serial {
            RunConfig::serial()
        } else {
            RunConfig::default()
        };
        Scheduler::new(config).run(root(&[demo])).await
    }

    #[test]
    fn test_demo_names_unique() {
        let names: HashSet<_> = all().iter().map(|d| d.name).collect();
        assert_eq!(names.len(), all().len());
    }

    #[test]
    fn test_find_unknown_demo() {
        assert_eq!(find("delay").map(|d| d.name), Ok("delay"));
        assert_eq!(
            find("nope").map(|d| d.name),
            Err(DemoError::Unknown("nope".to_string()))
        );
    }

    #[test]
    fn test_default_selection_excludes_exclusive_demos() {
        let selected = select(&[]).unwrap();
        let names: Vec<_> = selected.iter().map(|d| d.name).collect();

        assert!(names.contains(&"delay"));
        assert!(!names.contains(&"only"));
        assert!(!names.contains(&"parallel-only"));
        assert!(!names.contains(&"disable"));
        assert!(!root(&selected).contains_only());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_demo_matches_expected_totals() {
        for demo in all() {
            let summary = run(demo).await;
            let actual = expect(summary.passed, summary.failing(), summary.pending);
            assert_eq!(actual, demo.expected, "demo '{}'", demo.name);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_demo_overlaps() {
        let start = Instant::now();
        let summary = run(find("delay").unwrap()).await;

        assert_eq!(summary.passed, 3);
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_demo_takes_one_second() {
        let start = Instant::now();
        run(find("disable").unwrap()).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_proxy_failure_message() {
        let summary = run(find("context-proxy").unwrap()).await;

        let failure = summary.outcome("test1").unwrap().failure.clone().unwrap();
        assert!(failure.message.contains("timeout of 100ms exceeded"));
        assert!(summary.outcome("test3").unwrap().slow);
    }
}
