//! Context handed to hook and test callbacks

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::context::{ContextRegistry, ExecutionContext};
use super::timeout::RunnableControl;

/// Returned by [`RunnableContext::skip`]; propagate it with `?` to stop early
#[derive(Debug, Error)]
#[error("skipped")]
pub struct Skipped;

/// The running hook or test, as seen from inside its callback
#[derive(Clone)]
pub struct RunnableContext {
    title: Arc<str>,
    context: Arc<ExecutionContext>,
    control: Arc<RunnableControl>,
    registry: Arc<ContextRegistry>,
}

impl RunnableContext {
    pub fn new(
        title: impl Into<Arc<str>>,
        context: Arc<ExecutionContext>,
        control: Arc<RunnableControl>,
        registry: Arc<ContextRegistry>,
    ) -> Self {
        Self {
            title: title.into(),
            context,
            control,
            registry,
        }
    }

    /// Title of the hook or test
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Full title of the test or suite this runnable works for
    pub fn full_title(&self) -> String {
        self.context.label()
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Change this runnable's deadline; zero disables it
    pub fn timeout(&self, timeout: Duration) {
        self.control.set_timeout(timeout);
    }

    pub fn current_timeout(&self) -> Duration {
        self.control.timeout()
    }

    /// Change this runnable's slow threshold
    pub fn slow(&self, slow: Duration) {
        self.control.set_slow(slow);
    }

    /// Mark this runnable pending; its supervision ends at once
    pub fn skip(&self) -> Skipped {
        self.control.mark_skipped();
        Skipped
    }

    pub fn is_skipped(&self) -> bool {
        self.control.is_skipped()
    }

    /// Spawn background work whose failures are attributed to this runnable
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.registry.spawn_tagged(Arc::clone(&self.context), fut)
    }
}
