//! Execution context registry
//!
//! Every concurrently scheduled line of execution (one per test, one per
//! suite's all-hooks) owns a private context stack held in task-local
//! storage. Background work started while a context is active is tagged
//! with that context when it is spawned, so a failure it raises later is
//! routed to its originating test instead of whatever is running at that
//! moment.

use futures::FutureExt;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::panic;
use crate::events::{Emitter, Event};
use crate::models::{Failure, FailureKind, TestId};

/// Receives failures attributed to one open context
pub type FailureInbox = mpsc::UnboundedReceiver<Failure>;

/// Registry-wide context identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// What a context stands for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextOwner {
    /// A suite while its all-hooks run
    Suite(Vec<String>),
    /// A test, including its each-hooks
    Test(TestId),
}

/// Logical identity of the runnable a line of execution is working for
#[derive(Debug)]
pub struct ExecutionContext {
    pub id: ContextId,
    pub owner: ContextOwner,
}

impl ExecutionContext {
    pub fn label(&self) -> String {
        match &self.owner {
            ContextOwner::Suite(path) => path
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
            ContextOwner::Test(test) => test.full_title(),
        }
    }

    pub fn test(&self) -> Option<&TestId> {
        match &self.owner {
            ContextOwner::Test(test) => Some(test),
            ContextOwner::Suite(_) => None,
        }
    }
}

/// How a context ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Passed,
    Failed,
    Skipped,
}

/// Where a reported failure ended up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribution {
    /// Delivered to the still-open originating context
    Delivered,
    /// Originating context already passed; reported as a late failure
    Late,
    /// Originating context already failed or was skipped
    Dropped,
}

enum Slot {
    Open(mpsc::UnboundedSender<Failure>),
    Settled(Settlement),
}

struct Entry {
    context: Arc<ExecutionContext>,
    slot: Slot,
    /// Tagged background tasks still running for this context
    in_flight: usize,
    released: bool,
}

impl Entry {
    fn is_collectable(&self) -> bool {
        self.released && self.in_flight == 0 && matches!(self.slot, Slot::Settled(_))
    }
}

/// Shared registry of every context opened during a run
pub struct ContextRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<ContextId, Entry>>,
    emitter: Emitter,
}

impl ContextRegistry {
    pub fn new(emitter: Emitter) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
            emitter,
        })
    }

    /// Open a context and return the inbox its failures are delivered to
    pub fn open(&self, owner: ContextOwner) -> (Arc<ExecutionContext>, FailureInbox) {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let context = Arc::new(ExecutionContext { id, owner });
        let (tx, rx) = mpsc::unbounded_channel();
        self.entries.lock().insert(
            id,
            Entry {
                context: Arc::clone(&context),
                slot: Slot::Open(tx),
                in_flight: 0,
                released: false,
            },
        );
        debug!("opened {} for {}", id, context.label());
        (context, rx)
    }

    /// Close a context; later failures are judged against its settlement
    pub fn settle(&self, id: ContextId, settlement: Settlement) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.slot = Slot::Settled(settlement);
        }
    }

    /// Forget a settled context once no tagged work can still report to it
    ///
    /// Failures that arrive before then are still judged against the
    /// settlement; the entry goes away when its last background task ends.
    pub fn release(&self, id: ContextId) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else { return };
        entry.released = true;
        if entry.is_collectable() {
            entries.remove(&id);
            debug!("released {}", id);
        }
    }

    /// Contexts currently held by the registry
    pub fn tracked(&self) -> usize {
        self.entries.lock().len()
    }

    fn task_started(&self, id: ContextId) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.in_flight += 1;
        }
    }

    fn task_finished(&self, id: ContextId) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else { return };
        entry.in_flight = entry.in_flight.saturating_sub(1);
        if entry.is_collectable() {
            entries.remove(&id);
            debug!("released {} after its background work ended", id);
        }
    }

    pub fn context(&self, id: ContextId) -> Option<Arc<ExecutionContext>> {
        self.entries.lock().get(&id).map(|e| Arc::clone(&e.context))
    }

    /// Route a failure to the context that originated the failing work
    pub fn report(&self, origin: ContextId, failure: Failure) -> Attribution {
        let (context, settlement) = {
            let entries = self.entries.lock();
            let Some(entry) = entries.get(&origin) else {
                warn!("failure from unknown {}: {}", origin, failure);
                return Attribution::Dropped;
            };
            match &entry.slot {
                Slot::Open(tx) => {
                    if tx.send(failure.clone()).is_ok() {
                        return Attribution::Delivered;
                    }
                    (Arc::clone(&entry.context), Settlement::Passed)
                }
                Slot::Settled(settlement) => (Arc::clone(&entry.context), *settlement),
            }
        };

        if settlement != Settlement::Passed {
            debug!(
                "dropping failure for already settled {} ({:?}): {}",
                context.label(),
                settlement,
                failure
            );
            return Attribution::Dropped;
        }

        warn!("late failure from {}: {}", context.label(), failure);
        match &context.owner {
            ContextOwner::Test(test) => self.emitter.emit(Event::LateFailure {
                test: test.clone(),
                failure,
            }),
            ContextOwner::Suite(suite) => self.emitter.emit(Event::SuiteFail {
                suite: suite.clone(),
                failure,
            }),
        }
        Attribution::Late
    }

    /// Run a future as a new line of execution with an empty context stack
    pub async fn line<F: Future>(self: &Arc<Self>, fut: F) -> F::Output {
        LINE.scope(Line::new(Arc::clone(self), None), fut).await
    }

    /// Spawn background work tagged with its originating context
    pub fn spawn_tagged<F>(self: &Arc<Self>, origin: Arc<ExecutionContext>, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let registry = Arc::clone(self);
        let line = Line::new(Arc::clone(self), Some(Arc::clone(&origin)));
        self.task_started(origin.id);
        tokio::spawn(LINE.scope(line, async move {
            let failure = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(Failure::from_error(error, FailureKind::Uncaught)),
                Err(payload) => Some(Failure::from_panic(payload, panic::take_location())),
            };
            if let Some(failure) = failure {
                registry.report(origin.id, failure.with_kind(FailureKind::Uncaught));
            }
            registry.task_finished(origin.id);
        }))
    }
}

struct Line {
    registry: Arc<ContextRegistry>,
    stack: RefCell<Vec<Arc<ExecutionContext>>>,
}

impl Line {
    fn new(registry: Arc<ContextRegistry>, seed: Option<Arc<ExecutionContext>>) -> Self {
        Self {
            registry,
            stack: RefCell::new(seed.into_iter().collect()),
        }
    }
}

tokio::task_local! {
    static LINE: Line;
}

/// Active context on the calling line; popped when dropped
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    id: Option<ContextId>,
}

impl ContextGuard {
    pub fn leave(self) {}
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let Some(id) = self.id else { return };
        let _ = LINE.try_with(|line| {
            let mut stack = line.stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|c| c.id == id) {
                stack.remove(pos);
            }
        });
    }
}

/// Push a context onto the calling line's stack
pub fn enter(context: Arc<ExecutionContext>) -> ContextGuard {
    let id = context.id;
    let entered = LINE.try_with(|line| line.stack.borrow_mut().push(context));
    if entered.is_err() {
        warn!("entered {} outside a scheduled line of execution", id);
        return ContextGuard { id: None };
    }
    ContextGuard { id: Some(id) }
}

/// Innermost active context of the calling line
pub fn current() -> Option<Arc<ExecutionContext>> {
    LINE.try_with(|line| line.stack.borrow().last().cloned())
        .ok()
        .flatten()
}

/// True while running inside a scheduled line of execution
pub fn in_line() -> bool {
    LINE.try_with(|_| ()).is_ok()
}

/// Spawn background work tagged with the calling line's current context
///
/// Outside a scheduled line the work runs untagged and its failures are
/// only logged.
pub fn spawn<F>(fut: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let tagged = LINE
        .try_with(|line| {
            let origin = line.stack.borrow().last().cloned();
            origin.map(|origin| (Arc::clone(&line.registry), origin))
        })
        .ok()
        .flatten();

    match tagged {
        Some((registry, origin)) => registry.spawn_tagged(origin, fut),
        None => {
            warn!("spawn outside a scheduled runnable; failures will not be attributed");
            tokio::spawn(async move {
                if let Err(e) = fut.await {
                    warn!("untagged background work failed: {:#}", e);
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use std::time::Duration;

    fn test_id(title: &str) -> TestId {
        TestId {
            ordinal: 0,
            suite: vec!["suite".to_string()],
            title: title.to_string(),
        }
    }

    fn registry() -> (Arc<ContextRegistry>, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        (ContextRegistry::new(Emitter::new(vec![log.clone()])), log)
    }

    #[tokio::test]
    async fn test_enter_leave_current() {
        let (registry, _) = registry();
        let (outer, _outer_inbox) = registry.open(ContextOwner::Suite(vec!["suite".into()]));
        let (inner, _inner_inbox) = registry.open(ContextOwner::Test(test_id("t1")));

        assert!(current().is_none());
        registry
            .line(async {
                let outer_guard = enter(outer.clone());
                assert_eq!(current().map(|c| c.id), Some(outer.id));
                {
                    let _inner_guard = enter(inner.clone());
                    assert_eq!(current().map(|c| c.id), Some(inner.id));
                }
                assert_eq!(current().map(|c| c.id), Some(outer.id));
                outer_guard.leave();
                assert!(current().is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn test_lines_do_not_share_stacks() {
        let (registry, _) = registry();
        let (a, _ia) = registry.open(ContextOwner::Test(test_id("a")));
        let (b, _ib) = registry.open(ContextOwner::Test(test_id("b")));

        let line_a = registry.line(async {
            let _g = enter(a.clone());
            tokio::time::sleep(Duration::from_millis(20)).await;
            current().map(|c| c.id)
        });
        let line_b = registry.line(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _g = enter(b.clone());
            tokio::time::sleep(Duration::from_millis(20)).await;
            current().map(|c| c.id)
        });

        let (seen_a, seen_b) = tokio::join!(line_a, line_b);
        assert_eq!(seen_a, Some(a.id));
        assert_eq!(seen_b, Some(b.id));
    }

    #[tokio::test]
    async fn test_spawned_failure_routes_to_origin() {
        let (registry, _) = registry();
        let (origin, mut inbox) = registry.open(ContextOwner::Test(test_id("origin")));
        let (other, mut other_inbox) = registry.open(ContextOwner::Test(test_id("other")));

        let handle = registry
            .line(async {
                let _g = enter(origin.clone());
                spawn(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    anyhow::bail!("background boom")
                })
            })
            .await;

        registry
            .line(async {
                let _g = enter(other.clone());
                handle.await.unwrap();
            })
            .await;

        let failure = inbox.recv().await.unwrap();
        assert_eq!(failure.kind, FailureKind::Uncaught);
        assert_eq!(failure.message, "background boom");
        assert!(other_inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_failure_after_pass_is_emitted() {
        let (registry, log) = registry();
        let (ctx, _inbox) = registry.open(ContextOwner::Test(test_id("t1")));
        registry.settle(ctx.id, Settlement::Passed);

        let attribution = registry.report(ctx.id, Failure::new(FailureKind::Uncaught, "late"));
        assert_eq!(attribution, Attribution::Late);
        assert_eq!(log.for_test("t1"), vec!["late-failure"]);
    }

    #[tokio::test]
    async fn test_failure_after_failed_settlement_is_dropped() {
        let (registry, log) = registry();
        let (ctx, _inbox) = registry.open(ContextOwner::Test(test_id("t1")));
        registry.settle(ctx.id, Settlement::Failed);

        let attribution = registry.report(ctx.id, Failure::new(FailureKind::Uncaught, "again"));
        assert_eq!(attribution, Attribution::Dropped);
        assert!(log.events().is_empty());
    }

    #[tokio::test]
    async fn test_released_context_is_forgotten() {
        let (registry, _) = registry();
        let (ctx, _inbox) = registry.open(ContextOwner::Test(test_id("t1")));
        let (_open, _open_inbox) = registry.open(ContextOwner::Test(test_id("t2")));
        assert_eq!(registry.tracked(), 2);

        registry.settle(ctx.id, Settlement::Passed);
        assert_eq!(registry.tracked(), 2);
        registry.release(ctx.id);
        assert_eq!(registry.tracked(), 1);
        assert!(registry.context(ctx.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_waits_for_background_work() {
        let (registry, log) = registry();
        let (ctx, _inbox) = registry.open(ContextOwner::Test(test_id("t1")));

        let handle = registry.spawn_tagged(ctx.clone(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            anyhow::bail!("after settling")
        });
        registry.settle(ctx.id, Settlement::Passed);
        registry.release(ctx.id);
        assert_eq!(registry.tracked(), 1);

        handle.await.unwrap();
        assert_eq!(log.for_test("t1"), vec!["late-failure"]);
        assert_eq!(registry.tracked(), 0);
    }

    #[tokio::test]
    async fn test_nested_spawn_keeps_origin() {
        panic::install_hook();
        let (registry, _) = registry();
        let (origin, mut inbox) = registry.open(ContextOwner::Test(test_id("origin")));

        registry.spawn_tagged(origin.clone(), async {
            spawn(async {
                panic!("nested panic");
            });
            Ok(())
        });

        let failure = inbox.recv().await.unwrap();
        assert_eq!(failure.kind, FailureKind::Uncaught);
        assert_eq!(failure.message, "nested panic");
        assert!(failure.location.is_some());
    }
}
