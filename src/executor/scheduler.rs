//! Suite scheduler
//!
//! Runs a [`RunPlan`] with overlapping suites. Top-level suites are tokio
//! tasks bounded by a semaphore; inside a suite, every test's line
//! (before-each chain, body, after-each chain) and every child suite is
//! driven concurrently once the suite's before-all hooks have passed.
//! With parallelism disabled the same steps are awaited one after another.

use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::hooks::{compose, ComposedHook};
use super::plan::{PlannedSuite, PlannedTest, RunPlan};
use crate::config::RunConfig;
use crate::events::{Aggregator, Emitter, Event, Reporter};
use crate::execution::{
    enter, install_hook, ContextOwner, ContextRegistry, ExecutionContext, FailureInbox,
    RunnableContext, Settlement, Supervised, TimeoutController,
};
use crate::models::{Failure, HookKind, RunSummary, Suite, TestId, TestState};
use crate::utils::Timer;

/// Runs suite trees and reports their lifecycle
pub struct Scheduler {
    config: RunConfig,
    reporters: Vec<Arc<dyn Reporter>>,
}

impl Scheduler {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            reporters: Vec::new(),
        }
    }

    /// Add a reporter that receives every event as it happens
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run a suite tree to completion
    ///
    /// Failures never abort the run; they are reported and counted in the
    /// returned summary.
    pub async fn run(&self, root: Suite) -> RunSummary {
        self.run_plan(RunPlan::build(Arc::new(root))).await
    }

    pub async fn run_plan(&self, plan: RunPlan) -> RunSummary {
        install_hook();

        let aggregator = Arc::new(Aggregator::new());
        let mut sinks = self.reporters.clone();
        sinks.push(aggregator.clone());
        let emitter = Emitter::new(sinks);

        let shared = Arc::new(Shared {
            registry: ContextRegistry::new(emitter.clone()),
            emitter,
            timeouts: TimeoutController::new(self.config.timeout(), self.config.slow()),
            parallel: self.config.parallel,
            width: self.config.width(plan.top_level().len()),
        });

        info!(
            "Running {} tests in {} suites ({}, width {})",
            plan.test_count(),
            plan.top_level().len(),
            if shared.parallel { "parallel" } else { "serial" },
            shared.width
        );

        let timer = Timer::start("run");
        shared.emitter.emit(Event::RunStart {
            total: plan.test_count(),
            parallel: shared.parallel,
        });

        run_suite(Arc::clone(&shared), plan.root).await;

        let duration_ms = timer.stop().as_millis() as u64;
        shared.emitter.emit(Event::RunEnd { duration_ms });

        let summary = aggregator.summary();
        info!(
            "Run completed in {}ms - {} passing, {} failing, {} pending",
            duration_ms,
            summary.passed,
            summary.failing(),
            summary.pending
        );
        summary
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(RunConfig::default())
    }
}

struct Shared {
    emitter: Emitter,
    registry: Arc<ContextRegistry>,
    timeouts: TimeoutController,
    parallel: bool,
    width: usize,
}

/// How a suite's before-all chain ended
enum Setup {
    Ready,
    Skipped,
    Failed,
}

fn run_suite(shared: Arc<Shared>, planned: Arc<PlannedSuite>) -> BoxFuture<'static, ()> {
    async move {
        let is_root = planned.is_root();
        if !is_root {
            shared.emitter.emit(Event::SuiteStart {
                suite: planned.path.clone(),
            });
        }

        if planned.skipped {
            debug!("suite '{}' skipped", planned.title());
            shared.emit_skipped_contents(&planned);
            shared.end_suite(&planned);
            return;
        }

        let registry = Arc::clone(&shared.registry);
        let (context, mut inbox) = registry.open(ContextOwner::Suite(planned.path.clone()));

        let setup = registry
            .line(shared.run_all_hooks(&planned, &context, &mut inbox, HookKind::BeforeAll))
            .await;

        match setup {
            Setup::Ready => shared.run_contents(&planned).await,
            Setup::Skipped => shared.emit_skipped_contents(&planned),
            Setup::Failed => {
                registry.settle(context.id, Settlement::Failed);
                registry.release(context.id);
                shared.end_suite(&planned);
                return;
            }
        }

        let teardown = registry
            .line(shared.run_all_hooks(&planned, &context, &mut inbox, HookKind::AfterAll))
            .await;

        let mut failed = matches!(teardown, Setup::Failed);
        while let Ok(failure) = inbox.try_recv() {
            shared.suite_failed(&planned, failure);
            failed = true;
        }
        registry.settle(
            context.id,
            if failed {
                Settlement::Failed
            } else {
                Settlement::Passed
            },
        );
        registry.release(context.id);
        shared.end_suite(&planned);
    }
    .boxed()
}

fn run_test(
    shared: Arc<Shared>,
    planned: Arc<PlannedSuite>,
    test: PlannedTest,
) -> BoxFuture<'static, ()> {
    async move {
        if test.skipped {
            shared.emitter.emit(Event::TestPending { test: test.id });
            return;
        }
        let registry = Arc::clone(&shared.registry);
        registry.line(shared.run_test_line(&planned, &test)).await;
    }
    .boxed()
}

impl Shared {
    async fn run_contents(self: &Arc<Self>, planned: &Arc<PlannedSuite>) {
        let tests: Vec<_> = planned
            .tests
            .iter()
            .map(|t| run_test(Arc::clone(self), Arc::clone(planned), t.clone()))
            .collect();

        if !self.parallel {
            for test in tests {
                test.await;
            }
            for child in &planned.children {
                run_suite(Arc::clone(self), Arc::clone(child)).await;
            }
            return;
        }

        let children = if planned.is_root() {
            self.dispatch_top_level(planned).boxed()
        } else {
            let children: Vec<_> = planned
                .children
                .iter()
                .map(|c| run_suite(Arc::clone(self), Arc::clone(c)))
                .collect();
            join_all(children).map(|_| ()).boxed()
        };

        futures::join!(join_all(tests), children);
    }

    /// Spawn every top-level suite, at most `width` at a time
    async fn dispatch_top_level(self: &Arc<Self>, root: &Arc<PlannedSuite>) {
        let semaphore = Arc::new(Semaphore::new(self.width));
        let mut handles = Vec::new();

        for suite in &root.children {
            let semaphore = semaphore.clone();
            let shared = Arc::clone(self);
            let suite = Arc::clone(suite);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    warn!("dispatch semaphore closed; suite '{}' not run", suite.title());
                    return;
                };
                debug!("dispatching suite '{}'", suite.title());
                run_suite(shared, suite).await;
            }));
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("suite task ended abnormally: {}", e);
            }
        }
    }

    async fn run_all_hooks(
        &self,
        planned: &PlannedSuite,
        context: &Arc<ExecutionContext>,
        inbox: &mut FailureInbox,
        kind: HookKind,
    ) -> Setup {
        let _guard = enter(Arc::clone(context));
        let hooks = compose(&planned.ancestry);
        let title = planned.title().to_string();

        for hook in hooks.declared_at(kind, planned.depth()) {
            match self.run_hook(planned, hook, context, inbox, &title).await {
                Supervised::Completed => {}
                Supervised::Skipped => return Setup::Skipped,
                Supervised::Failed(failure) | Supervised::Uncaught(failure) => {
                    self.suite_failed(planned, failure);
                    return Setup::Failed;
                }
            }
        }
        Setup::Ready
    }

    async fn run_test_line(&self, planned: &PlannedSuite, test: &PlannedTest) {
        let id = &test.id;
        let mut state = TestState::Pending;
        advance(id, &mut state, TestState::Running);
        self.emitter.emit(Event::TestStart { test: id.clone() });

        let hooks = compose(&planned.ancestry);
        let (context, mut inbox) = self.registry.open(ContextOwner::Test(id.clone()));
        let _guard = enter(Arc::clone(&context));

        let mut outcome = Supervised::Completed;
        for hook in &hooks.before_each {
            outcome = self
                .run_hook(planned, hook, &context, &mut inbox, &id.title)
                .await;
            if outcome != Supervised::Completed {
                break;
            }
        }

        let mut duration_ms = 0;
        let mut slow = planned.slow();
        if outcome == Supervised::Completed {
            let control = self
                .timeouts
                .arm(test.test.timeout.or(planned.timeout()), test.test.slow.or(slow));
            let ctx = RunnableContext::new(
                test.test.title.as_str(),
                Arc::clone(&context),
                Arc::clone(&control),
                Arc::clone(&self.registry),
            );
            let timer = Timer::start(id.full_title());
            outcome = self
                .timeouts
                .supervise(&control, test.test.callback.invoke(ctx), Some(&mut inbox))
                .await;
            duration_ms = timer.stop().as_millis() as u64;
            slow = Some(control.slow());
        }

        for hook in &hooks.after_each {
            let teardown = self
                .run_hook(planned, hook, &context, &mut inbox, &id.title)
                .await;
            if let Some(failure) = teardown.into_failure() {
                if outcome == Supervised::Completed {
                    outcome = Supervised::Failed(failure);
                } else {
                    debug!("{}: additional after each failure: {}", id, failure);
                }
            }
        }

        if outcome == Supervised::Completed {
            if let Ok(failure) = inbox.try_recv() {
                outcome = Supervised::Failed(failure);
            }
        }

        match outcome {
            Supervised::Completed => {
                advance(id, &mut state, TestState::Passed);
                self.registry.settle(context.id, Settlement::Passed);
                let threshold = slow.unwrap_or_default().as_millis() as u64;
                self.emitter.emit(Event::TestPass {
                    test: id.clone(),
                    duration_ms,
                    slow: threshold > 0 && duration_ms > threshold,
                });
                while let Ok(failure) = inbox.try_recv() {
                    self.registry.report(context.id, failure);
                }
            }
            Supervised::Failed(failure) | Supervised::Uncaught(failure) => {
                advance(id, &mut state, TestState::Failed);
                self.registry.settle(context.id, Settlement::Failed);
                debug!("{} failed: {}", id, failure);
                self.emitter.emit(Event::TestFail {
                    test: id.clone(),
                    duration_ms,
                    failure,
                });
            }
            Supervised::Skipped => {
                advance(id, &mut state, TestState::Skipped);
                self.registry.settle(context.id, Settlement::Skipped);
                self.emitter.emit(Event::TestPending { test: id.clone() });
            }
        }
        self.registry.release(context.id);
    }

    /// Run one hook under its own deadline, attributed to `context`
    async fn run_hook(
        &self,
        planned: &PlannedSuite,
        hook: &ComposedHook,
        context: &Arc<ExecutionContext>,
        inbox: &mut FailureInbox,
        runnable: &str,
    ) -> Supervised {
        let control = self
            .timeouts
            .arm(planned.timeout_at(hook.level), planned.slow_at(hook.level));
        let ctx = RunnableContext::new(
            hook.label(),
            Arc::clone(context),
            Arc::clone(&control),
            Arc::clone(&self.registry),
        );

        // background failures keep their own kind; only the hook's result is wrapped
        match self
            .timeouts
            .supervise(&control, hook.hook.callback.invoke(ctx), Some(inbox))
            .await
        {
            Supervised::Failed(failure) => {
                Supervised::Failed(failure.in_hook(&hook.label(), runnable))
            }
            other => other,
        }
    }

    fn suite_failed(&self, planned: &PlannedSuite, failure: Failure) {
        warn!("suite '{}' failed: {}", planned.title(), failure);
        self.emitter.emit(Event::SuiteFail {
            suite: planned.path.clone(),
            failure,
        });
    }

    /// Report every test below `planned` pending without running anything
    fn emit_skipped_contents(&self, planned: &PlannedSuite) {
        for test in &planned.tests {
            self.emitter.emit(Event::TestPending {
                test: test.id.clone(),
            });
        }
        for child in &planned.children {
            self.emitter.emit(Event::SuiteStart {
                suite: child.path.clone(),
            });
            self.emit_skipped_contents(child);
            self.end_suite(child);
        }
    }

    fn end_suite(&self, planned: &PlannedSuite) {
        if !planned.is_root() {
            self.emitter.emit(Event::SuiteEnd {
                suite: planned.path.clone(),
            });
        }
    }
}

fn advance(id: &TestId, state: &mut TestState, next: TestState) {
    match state.advance(next) {
        Ok(advanced) => *state = advanced,
        Err(e) => warn!("{}: {}", id, e),
    }
}
