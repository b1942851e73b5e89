//! Suite tree models
//!
//! Suites, tests, hooks and the uniform callback contract they share.

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::execution::RunnableContext;

/// Future produced by every hook and test callback
pub type CallbackFuture = BoxFuture<'static, anyhow::Result<()>>;

type CallbackFn = dyn Fn(RunnableContext) -> CallbackFuture + Send + Sync;

/// A hook or test body
///
/// Synchronous bodies, async bodies and bodies that signal completion
/// through [`Done`] all become the same future. The user function only
/// runs when that future is first polled.
#[derive(Clone)]
pub struct Callback(Arc<CallbackFn>);

impl Callback {
    /// A body that completes when it returns
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&RunnableContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self(Arc::new(move |ctx| {
            let f = Arc::clone(&f);
            async move { f(&ctx) }.boxed()
        }))
    }

    /// A body that completes when its future resolves
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(RunnableContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self(Arc::new(move |ctx| {
            let f = Arc::clone(&f);
            async move { f(ctx).await }.boxed()
        }))
    }

    /// A body that completes when it signals through [`Done`]
    ///
    /// Dropping the signal without calling it leaves the body running
    /// until its deadline.
    pub fn with_done<F>(f: F) -> Self
    where
        F: Fn(RunnableContext, Done) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self(Arc::new(move |ctx| {
            let f = Arc::clone(&f);
            async move {
                let (tx, rx) = oneshot::channel();
                f(ctx, Done(tx));
                match rx.await {
                    Ok(result) => result,
                    Err(_) => std::future::pending().await,
                }
            }
            .boxed()
        }))
    }

    pub fn invoke(&self, ctx: RunnableContext) -> CallbackFuture {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

/// One-shot completion signal for [`Callback::with_done`] bodies
#[derive(Debug)]
pub struct Done(oneshot::Sender<anyhow::Result<()>>);

impl Done {
    /// Signal successful completion
    pub fn ok(self) {
        self.signal(Ok(()));
    }

    /// Signal completion with a failure
    pub fn fail(self, error: impl Into<anyhow::Error>) {
        self.signal(Err(error.into()));
    }

    fn signal(self, result: anyhow::Result<()>) {
        if self.0.send(result).is_err() {
            debug!("completion signal arrived after the runnable settled; ignored");
        }
    }
}

/// Hook scope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookScope {
    /// Runs once per suite
    All,
    /// Runs once per test
    Each,
}

/// The four hook slots of a suite
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

impl HookKind {
    pub fn label(&self) -> &'static str {
        match self {
            HookKind::BeforeAll => "before all",
            HookKind::BeforeEach => "before each",
            HookKind::AfterEach => "after each",
            HookKind::AfterAll => "after all",
        }
    }

    pub fn scope(&self) -> HookScope {
        match self {
            HookKind::BeforeAll | HookKind::AfterAll => HookScope::All,
            HookKind::BeforeEach | HookKind::AfterEach => HookScope::Each,
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A declared hook
#[derive(Clone, Debug)]
pub struct Hook {
    pub title: Option<String>,
    pub callback: Callback,
}

/// A declared test
#[derive(Clone, Debug)]
pub struct Test {
    pub title: String,
    pub callback: Callback,
    pub only: bool,
    pub skip: bool,
    pub timeout: Option<Duration>,
    pub slow: Option<Duration>,
}

impl Test {
    pub fn new(title: impl Into<String>, callback: Callback) -> Self {
        Self {
            title: title.into(),
            callback,
            only: false,
            skip: false,
            timeout: None,
            slow: None,
        }
    }

    pub fn only(mut self) -> Self {
        self.only = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn slow(mut self, slow: Duration) -> Self {
        self.slow = Some(slow);
        self
    }
}

/// Suite flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SuiteFlags {
    pub only: bool,
    pub skip: bool,
    pub disabled: bool,
}

/// A declared suite
#[derive(Clone, Debug, Default)]
pub struct Suite {
    pub title: String,
    pub tests: Vec<Arc<Test>>,
    pub children: Vec<Arc<Suite>>,
    pub before_all: Vec<Hook>,
    pub before_each: Vec<Hook>,
    pub after_each: Vec<Hook>,
    pub after_all: Vec<Hook>,
    pub flags: SuiteFlags,
    pub timeout: Option<Duration>,
    pub slow: Option<Duration>,
}

impl Suite {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// The untitled root of a run
    pub fn root() -> Self {
        Self::default()
    }

    pub fn test(mut self, test: Test) -> Self {
        self.tests.push(Arc::new(test));
        self
    }

    pub fn child(mut self, suite: Suite) -> Self {
        self.children.push(Arc::new(suite));
        self
    }

    pub fn hook(mut self, kind: HookKind, title: Option<String>, callback: Callback) -> Self {
        let hook = Hook { title, callback };
        match kind {
            HookKind::BeforeAll => self.before_all.push(hook),
            HookKind::BeforeEach => self.before_each.push(hook),
            HookKind::AfterEach => self.after_each.push(hook),
            HookKind::AfterAll => self.after_all.push(hook),
        }
        self
    }

    pub fn before_all(self, callback: Callback) -> Self {
        self.hook(HookKind::BeforeAll, None, callback)
    }

    pub fn before_each(self, callback: Callback) -> Self {
        self.hook(HookKind::BeforeEach, None, callback)
    }

    pub fn after_each(self, callback: Callback) -> Self {
        self.hook(HookKind::AfterEach, None, callback)
    }

    pub fn after_all(self, callback: Callback) -> Self {
        self.hook(HookKind::AfterAll, None, callback)
    }

    pub fn only(mut self) -> Self {
        self.flags.only = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.flags.skip = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.flags.disabled = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn slow(mut self, slow: Duration) -> Self {
        self.slow = Some(slow);
        self
    }

    /// Hooks declared on this suite for one slot
    pub fn hooks(&self, kind: HookKind) -> &[Hook] {
        match kind {
            HookKind::BeforeAll => &self.before_all,
            HookKind::BeforeEach => &self.before_each,
            HookKind::AfterEach => &self.after_each,
            HookKind::AfterAll => &self.after_all,
        }
    }

    /// True if this suite or anything below it carries `only`
    pub fn contains_only(&self) -> bool {
        self.flags.only
            || self.tests.iter().any(|t| t.only)
            || self.children.iter().any(|c| c.contains_only())
    }

    /// Number of tests in this subtree
    pub fn test_count(&self) -> usize {
        self.tests.len() + self.children.iter().map(|c| c.test_count()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Emitter;
    use crate::execution::{ContextOwner, ContextRegistry, RunnableControl};
    use parking_lot::Mutex;
    use std::task::Poll;
    use tokio_test::{assert_pending, task};

    fn noop() -> Callback {
        Callback::sync(|_| Ok(()))
    }

    fn ctx() -> RunnableContext {
        let registry = ContextRegistry::new(Emitter::default());
        let (context, _inbox) = registry.open(ContextOwner::Suite(vec!["suite".into()]));
        RunnableContext::new(
            "runnable",
            context,
            RunnableControl::new(Duration::from_millis(2000), Duration::from_millis(75)),
            registry,
        )
    }

    #[test]
    fn test_callback_runs_on_first_poll() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let callback = Callback::sync(move |_| {
            *counter.lock() += 1;
            Ok(())
        });

        let mut body = task::spawn(callback.invoke(ctx()));
        assert_eq!(*calls.lock(), 0);
        assert!(matches!(body.poll(), Poll::Ready(Ok(()))));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_done_completes_body() {
        let callback = Callback::with_done(|_, done| done.ok());
        let mut body = task::spawn(callback.invoke(ctx()));
        assert!(matches!(body.poll(), Poll::Ready(Ok(()))));

        let failing = Callback::with_done(|_, done| done.fail(anyhow::anyhow!("nope")));
        let mut body = task::spawn(failing.invoke(ctx()));
        assert!(matches!(body.poll(), Poll::Ready(Err(_))));
    }

    #[test]
    fn test_dropped_done_never_completes() {
        let callback = Callback::with_done(|_, _done| {});
        let mut body = task::spawn(callback.invoke(ctx()));
        assert_pending!(body.poll());
        assert_pending!(body.poll());
    }

    #[test]
    fn test_suite_builder() {
        let suite = Suite::new("outer")
            .before_each(noop())
            .test(Test::new("a", noop()))
            .child(Suite::new("inner").test(Test::new("b", noop()).only()));

        assert_eq!(suite.hooks(HookKind::BeforeEach).len(), 1);
        assert_eq!(suite.hooks(HookKind::AfterAll).len(), 0);
        assert_eq!(suite.test_count(), 2);
        assert!(suite.contains_only());
        assert!(!suite.flags.only);
    }

    #[test]
    fn test_hook_kind_scope() {
        assert_eq!(HookKind::BeforeAll.scope(), HookScope::All);
        assert_eq!(HookKind::AfterEach.scope(), HookScope::Each);
        assert_eq!(HookKind::AfterEach.to_string(), "after each");
    }
}
