//! Host-side tasks.
//!
//! A task is a unit of work tracked by the host scheduler: an expression to
//! solve, together with the accumulated expression of its ancestors. Tasks are
//! immutable and shared via [`Arc`]; any per-task bookkeeping lives in the
//! component that needs it, keyed by [`TaskId`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::expr::Expr;

/// Process-unique task identity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct Task {
    id: TaskId,
    /// Opaque host value, propagated to tasks minted from this one.
    source: String,
    parent: Option<Arc<Task>>,
    expression: Expr,
}

impl Task {
    pub fn new(source: impl Into<String>, parent: Option<Arc<Task>>, expression: Expr) -> Arc<Self> {
        Arc::new(Task {
            id: TaskId::fresh(),
            source: source.into(),
            parent,
            expression,
        })
    }

    /// Creates a task without a parent.
    pub fn root(source: impl Into<String>, expression: Expr) -> Arc<Self> {
        Self::new(source, None, expression)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parent(&self) -> Option<&Arc<Task>> {
        self.parent.as_ref()
    }

    /// The task's own expression.
    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// Conjunction of the expressions of all ancestors and this task.
    pub fn full_expression(&self) -> Expr {
        let mut chain = vec![self.expression.clone()];
        let mut current = self.parent.as_deref();
        while let Some(task) = current {
            chain.push(task.expression.clone());
            current = task.parent.as_deref();
        }
        chain.reverse();
        Expr::conjunction(chain)
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl std::hash::Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
