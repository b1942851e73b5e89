//! Hook composition
//!
//! A pure function from a suite's ancestry to its four hook chains. Chains
//! are rebuilt for every test, so sibling suites running at the same time
//! never share hook state: an ancestor's before-each fires once per test,
//! once per suite path.

use std::sync::Arc;

use crate::models::{Hook, HookKind, HookScope, Suite};

/// A hook together with the suite level that declared it
#[derive(Clone, Debug)]
pub struct ComposedHook {
    pub kind: HookKind,
    /// Depth of the declaring suite; the root is 0
    pub level: usize,
    pub hook: Hook,
}

impl ComposedHook {
    pub fn scope(&self) -> HookScope {
        self.kind.scope()
    }

    /// Name used in hook failure messages
    pub fn label(&self) -> String {
        match &self.hook.title {
            Some(title) => format!("{}: {}", self.kind.label(), title),
            None => self.kind.label().to_string(),
        }
    }
}

/// The four ordered chains for one suite
#[derive(Clone, Debug, Default)]
pub struct ComposedHooks {
    pub before_all: Vec<ComposedHook>,
    pub before_each: Vec<ComposedHook>,
    pub after_each: Vec<ComposedHook>,
    pub after_all: Vec<ComposedHook>,
}

impl ComposedHooks {
    pub fn chain(&self, kind: HookKind) -> &[ComposedHook] {
        match kind {
            HookKind::BeforeAll => &self.before_all,
            HookKind::BeforeEach => &self.before_each,
            HookKind::AfterEach => &self.after_each,
            HookKind::AfterAll => &self.after_all,
        }
    }

    /// Hooks of one chain declared exactly at `level`
    ///
    /// All-hooks run once at their declaring level; deeper suites skip the
    /// inherited part of the chain.
    pub fn declared_at(&self, kind: HookKind, level: usize) -> impl Iterator<Item = &ComposedHook> {
        self.chain(kind).iter().filter(move |h| h.level == level)
    }
}

/// Compose the hook chains for the last suite of `ancestry`
///
/// Every chain is ordered root to leaf, the suite's own hooks last. After
/// hooks keep the same outer-to-inner order as before hooks.
pub fn compose(ancestry: &[Arc<Suite>]) -> ComposedHooks {
    let chain = |kind: HookKind| -> Vec<ComposedHook> {
        ancestry
            .iter()
            .enumerate()
            .flat_map(|(level, suite)| {
                suite.hooks(kind).iter().map(move |hook| ComposedHook {
                    kind,
                    level,
                    hook: hook.clone(),
                })
            })
            .collect()
    };

    ComposedHooks {
        before_all: chain(HookKind::BeforeAll),
        before_each: chain(HookKind::BeforeEach),
        after_each: chain(HookKind::AfterEach),
        after_all: chain(HookKind::AfterAll),
    }
}
