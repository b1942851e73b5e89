//! Run plan
//!
//! Applies `only`, `skip` and `disabled` to a suite tree. Tests removed by
//! `only` vanish without a trace; tests under `skip`/`disabled` stay in the
//! plan so the scheduler can report them pending.

use std::sync::Arc;
use std::time::Duration;

use crate::models::{Suite, Test, TestId};

/// A test as it will be scheduled
#[derive(Clone, Debug)]
pub struct PlannedTest {
    pub id: TestId,
    pub test: Arc<Test>,
    pub skipped: bool,
}

/// A suite as it will be scheduled
#[derive(Clone, Debug)]
pub struct PlannedSuite {
    pub suite: Arc<Suite>,
    /// Declaring suites from the root down to and including this one
    pub ancestry: Vec<Arc<Suite>>,
    pub path: Vec<String>,
    pub skipped: bool,
    pub tests: Vec<PlannedTest>,
    pub children: Vec<Arc<PlannedSuite>>,
}

impl PlannedSuite {
    pub fn title(&self) -> &str {
        &self.suite.title
    }

    /// Nesting depth; the root is 0
    pub fn depth(&self) -> usize {
        self.ancestry.len().saturating_sub(1)
    }

    pub fn is_root(&self) -> bool {
        self.depth() == 0
    }

    /// Nearest suite-level timeout at or above `level`
    pub fn timeout_at(&self, level: usize) -> Option<Duration> {
        let end = (level + 1).min(self.ancestry.len());
        self.ancestry[..end].iter().rev().find_map(|s| s.timeout)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_at(self.depth())
    }

    /// Nearest suite-level slow threshold at or above `level`
    pub fn slow_at(&self, level: usize) -> Option<Duration> {
        let end = (level + 1).min(self.ancestry.len());
        self.ancestry[..end].iter().rev().find_map(|s| s.slow)
    }

    pub fn slow(&self) -> Option<Duration> {
        self.slow_at(self.depth())
    }

    /// Planned tests in this subtree, skipped ones included
    pub fn test_count(&self) -> usize {
        self.tests.len() + self.children.iter().map(|c| c.test_count()).sum::<usize>()
    }
}

/// The filtered tree the scheduler executes
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub root: Arc<PlannedSuite>,
    /// Whether any `only` flag restricted the plan
    pub only_mode: bool,
}

impl RunPlan {
    pub fn build(root: Arc<Suite>) -> Self {
        let only_mode = root.contains_only();
        let mut planner = Planner {
            only_mode,
            next_ordinal: 0,
        };
        let planned = planner
            .plan_suite(&root, &[], false, false)
            .unwrap_or_else(|| planner.empty(&root));
        Self {
            root: Arc::new(planned),
            only_mode,
        }
    }

    pub fn test_count(&self) -> usize {
        self.root.test_count()
    }

    /// Top-level suites, in declaration order
    pub fn top_level(&self) -> &[Arc<PlannedSuite>] {
        &self.root.children
    }
}

struct Planner {
    only_mode: bool,
    next_ordinal: usize,
}

impl Planner {
    fn plan_suite(
        &mut self,
        suite: &Arc<Suite>,
        parents: &[Arc<Suite>],
        inherited_skip: bool,
        inherited_only: bool,
    ) -> Option<PlannedSuite> {
        let selected = inherited_only || suite.flags.only;
        if self.only_mode && !selected && !suite.contains_only() {
            return None;
        }
        let skipped = inherited_skip || suite.flags.skip || suite.flags.disabled;

        let mut ancestry = parents.to_vec();
        ancestry.push(Arc::clone(suite));
        let path: Vec<String> = ancestry.iter().map(|s| s.title.clone()).collect();

        let mut tests = Vec::new();
        for test in &suite.tests {
            if self.only_mode && !selected && !test.only {
                continue;
            }
            tests.push(PlannedTest {
                id: TestId {
                    ordinal: self.next_ordinal(),
                    suite: path.clone(),
                    title: test.title.clone(),
                },
                test: Arc::clone(test),
                skipped: skipped || test.skip,
            });
        }

        let mut children = Vec::new();
        for child in &suite.children {
            if let Some(planned) = self.plan_suite(child, &ancestry, skipped, selected) {
                children.push(Arc::new(planned));
            }
        }

        Some(PlannedSuite {
            suite: Arc::clone(suite),
            ancestry,
            path,
            skipped,
            tests,
            children,
        })
    }

    fn empty(&self, root: &Arc<Suite>) -> PlannedSuite {
        PlannedSuite {
            suite: Arc::clone(root),
            ancestry: vec![Arc::clone(root)],
            path: vec![root.title.clone()],
            skipped: false,
            tests: Vec::new(),
            children: Vec::new(),
        }
    }

    fn next_ordinal(&mut self) -> usize {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Callback;

    fn test(title: &str) -> Test {
        Test::new(title, Callback::sync(|_| Ok(())))
    }

    fn titles(suite: &PlannedSuite) -> Vec<(String, bool)> {
        let mut out: Vec<_> = suite
            .tests
            .iter()
            .map(|t| (t.id.title.clone(), t.skipped))
            .collect();
        for child in &suite.children {
            out.extend(titles(child));
        }
        out
    }

    #[test]
    fn test_plain_tree_keeps_everything() {
        let root = Suite::root()
            .child(Suite::new("a").test(test("a1")).test(test("a2")))
            .child(Suite::new("b").test(test("b1")));
        let plan = RunPlan::build(Arc::new(root));

        assert!(!plan.only_mode);
        assert_eq!(plan.test_count(), 3);
        assert_eq!(plan.top_level().len(), 2);
        assert_eq!(plan.top_level()[1].tests[0].id.ordinal, 2);
        assert_eq!(plan.top_level()[0].path, vec!["".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_only_test_selects_exactly_one() {
        let root = Suite::root().child(
            Suite::new("suite")
                .test(test("test1"))
                .test(test("test2").only())
                .test(test("test3")),
        );
        let plan = RunPlan::build(Arc::new(root));

        assert!(plan.only_mode);
        assert_eq!(titles(&plan.root), vec![("test2".to_string(), false)]);
    }

    #[test]
    fn test_only_suite_keeps_its_descendants() {
        let root = Suite::root()
            .child(Suite::new("ignored").test(test("x")))
            .child(
                Suite::new("chosen")
                    .only()
                    .test(test("c1"))
                    .child(Suite::new("nested").test(test("c2"))),
            );
        let plan = RunPlan::build(Arc::new(root));

        assert_eq!(plan.top_level().len(), 1);
        assert_eq!(plan.top_level()[0].title(), "chosen");
        assert_eq!(plan.test_count(), 2);
    }

    #[test]
    fn test_skip_and_disabled_mark_subtree_pending() {
        let root = Suite::root()
            .child(
                Suite::new("skipped")
                    .skip()
                    .test(test("s1"))
                    .child(Suite::new("inner").test(test("s2"))),
            )
            .child(Suite::new("disabled").disabled().test(test("d1")))
            .child(Suite::new("live").test(test("l1")).test(test("l2").skip()));
        let plan = RunPlan::build(Arc::new(root));

        assert_eq!(
            titles(&plan.root),
            vec![
                ("s1".to_string(), true),
                ("s2".to_string(), true),
                ("d1".to_string(), true),
                ("l1".to_string(), false),
                ("l2".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_only_under_skipped_suite_stays_pending() {
        let root = Suite::root()
            .child(Suite::new("skipped").skip().test(test("t").only()))
            .child(Suite::new("other").test(test("o")));
        let plan = RunPlan::build(Arc::new(root));

        assert_eq!(titles(&plan.root), vec![("t".to_string(), true)]);
    }

    #[test]
    fn test_timeout_inheritance() {
        let root = Suite::root().timeout(Duration::from_millis(500)).child(
            Suite::new("outer")
                .slow(Duration::from_millis(10))
                .child(Suite::new("inner").timeout(Duration::from_millis(100)).test(test("t"))),
        );
        let plan = RunPlan::build(Arc::new(root));
        let inner = &plan.top_level()[0].children[0];

        assert_eq!(inner.depth(), 2);
        assert_eq!(inner.timeout(), Some(Duration::from_millis(100)));
        assert_eq!(inner.timeout_at(1), Some(Duration::from_millis(500)));
        assert_eq!(inner.slow(), Some(Duration::from_millis(10)));
    }
}
