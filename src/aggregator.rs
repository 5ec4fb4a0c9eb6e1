//! Counting aggregator.
//!
//! The aggregator splits a task's expression into independent factors, hands
//! one sub-task per factor back to the host, and multiplies the sub-tasks'
//! model counts as their completions arrive. Completions may arrive in any
//! order, more than once, and concurrently from several threads.
//!
//! Per task, the aggregation moves through [`Phase`]s:
//!
//! ```text
//! Factored --> Partial --> Complete
//!     \           |
//!      +----------+--> EarlyZero
//! ```
//!
//! A task without factors starts out `Complete` with count 1.
//!
//! # Example
//!
//! ```rust
//! use factor_rs::aggregator::{Completion, CountAggregator};
//! use factor_rs::expr::Expr;
//! use factor_rs::task::Task;
//! use factor_rs::types::Variable;
//! use num_bigint::BigUint;
//!
//! let x = Expr::var(Variable::int("x"));
//! let y = Expr::var(Variable::int("y"));
//! let task = Task::root("example", Expr::and(Expr::lt(x, Expr::int(3)), Expr::gt(y, Expr::int(0))));
//!
//! let aggregator = CountAggregator::new();
//! let children = aggregator.request(&task);
//! assert_eq!(children.len(), 2);
//!
//! let first = aggregator.child_done(&task, &children[0], &BigUint::from(3u32));
//! assert_eq!(first, Completion::Pending);
//! let second = aggregator.child_done(&task, &children[1], &BigUint::from(7u32));
//! assert_eq!(second, Completion::Done(BigUint::from(21u32)));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use num_bigint::BigUint;

use crate::factor::{factorize, FactorContext};
use crate::report::Reporter;
use crate::task::{Task, TaskId};

/// Exact model count.
pub type Count = BigUint;

/// Outcome of feeding a completion to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// More sub-task completions are needed.
    Pending,
    /// The task's count is final.
    Done(Count),
    Failed(Failure),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    #[error("task {0} was never factored")]
    UnknownTask(TaskId),
    #[error("task {task} still waits for {outstanding} sub-task(s)")]
    LostNotifications { task: TaskId, outstanding: usize },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    /// Sub-tasks issued, none reported yet.
    Factored,
    /// At least one sub-count received.
    Partial,
    /// Every sub-task reported.
    Complete,
    /// Some sub-task reported zero models.
    EarlyZero,
}

#[derive(Debug)]
struct AggregationState {
    /// Sub-tasks issued for the task. Released once the count is final.
    children: Vec<Arc<Task>>,
    outstanding: HashSet<TaskId>,
    product: Count,
    phase: Phase,
}

impl AggregationState {
    fn is_final(&self) -> bool {
        matches!(self.phase, Phase::Complete | Phase::EarlyZero)
    }

    /// Drops everything but the phase and the product.
    fn finish(&mut self, phase: Phase) {
        self.phase = phase;
        self.children = Vec::new();
        self.outstanding = HashSet::new();
    }
}

#[derive(Debug)]
struct Entry {
    parent: Option<TaskId>,
    state: Mutex<AggregationState>,
}

/// Decomposition context of a parent, with the number of unfinished tasks
/// factorized against it.
#[derive(Debug)]
struct ContextSlot {
    context: Arc<FactorContext>,
    users: usize,
}

/// Snapshot of the aggregator's counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct AggregatorStats {
    /// Calls to [`CountAggregator::request`].
    pub invocations: usize,
    /// Tasks factorized (memoized calls excluded).
    pub total_constraints: usize,
    /// Factors produced over all factorized tasks.
    pub factored_constraints: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-task factorization and aggregation of sub-task counts.
///
/// Once a task's count is final, only its phase and count are kept: the
/// sub-tasks are released, and so is the parent's decomposition context when
/// no unfinished task uses it anymore.
#[derive(Debug, Default)]
pub struct CountAggregator {
    entries: Mutex<HashMap<TaskId, Arc<Entry>>>,
    contexts: Mutex<HashMap<TaskId, ContextSlot>>,
    invocations: AtomicUsize,
    total_constraints: AtomicUsize,
    factored_constraints: AtomicUsize,
}

impl CountAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, task: TaskId) -> Option<Arc<Entry>> {
        lock(&self.entries).get(&task).cloned()
    }

    /// Returns the decomposition context cached for `parent`, building it from
    /// the parent's full expression on first use, and registers one more user.
    fn acquire_context(&self, parent: &Task) -> Arc<FactorContext> {
        let mut contexts = lock(&self.contexts);
        let slot = contexts.entry(parent.id()).or_insert_with(|| {
            debug!("building factor context for parent {}", parent.id());
            ContextSlot {
                context: Arc::new(FactorContext::new(&parent.full_expression())),
                users: 0,
            }
        });
        slot.users += 1;
        slot.context.clone()
    }

    /// Unregisters one user of `parent`'s context, dropping the context with
    /// its last user.
    fn release_context(&self, parent: Option<TaskId>) {
        let Some(parent) = parent else { return };
        let mut contexts = lock(&self.contexts);
        if let Some(slot) = contexts.get_mut(&parent) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                debug!("releasing factor context of parent {}", parent);
                contexts.remove(&parent);
            }
        }
    }

    /// Factorizes `task` and returns one sub-task per factor for dispatch.
    ///
    /// The result is memoized: asking again for the same task returns the same
    /// sub-tasks and leaves the aggregation state untouched. Once the task's
    /// count is final there is nothing left to dispatch and the result is
    /// empty.
    pub fn request(&self, task: &Task) -> Vec<Arc<Task>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.entry(task.id()) {
            return lock(&entry.state).children.clone();
        }

        let parent = task.parent().map(|p| p.id());
        let context = task.parent().map(|p| self.acquire_context(p));
        let factors = factorize(task.expression(), context.as_deref());

        let children: Vec<Arc<Task>> = factors
            .into_iter()
            .map(|factor| {
                debug!("task {}: issuing sub-task for {}", task.id(), factor);
                Task::root(task.source(), factor)
            })
            .collect();
        let issued = children.len();

        let mut state = AggregationState {
            outstanding: children.iter().map(|c| c.id()).collect(),
            children,
            product: BigUint::from(1u8),
            phase: Phase::Factored,
        };
        if issued == 0 {
            state.finish(Phase::Complete);
        }
        let finished = state.is_final();
        let result = state.children.clone();
        let entry = Arc::new(Entry {
            parent,
            state: Mutex::new(state),
        });

        // Another thread may have factorized the same task meanwhile; the
        // first registered entry wins.
        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(&task.id()).cloned() {
            drop(entries);
            self.release_context(parent);
            return lock(&existing.state).children.clone();
        }
        entries.insert(task.id(), entry);
        drop(entries);

        if finished {
            self.release_context(parent);
        }

        self.total_constraints.fetch_add(1, Ordering::Relaxed);
        self.factored_constraints.fetch_add(issued, Ordering::Relaxed);
        info!("task {}: factorized into {} sub-task(s)", task.id(), issued);

        result
    }

    /// Records that `sub_task` of `task` has `sub_count` models.
    ///
    /// A zero count resolves the task to zero at once. A sub-task's count is
    /// applied at most once, and a final count never changes: repeated or late
    /// notifications return [`Completion::Pending`] without changing anything.
    pub fn child_done(&self, task: &Task, sub_task: &Task, sub_count: &Count) -> Completion {
        let Some(entry) = self.entry(task.id()) else {
            warn!("task {}: completion of {} for a task that was never factored", task.id(), sub_task.id());
            return Completion::Failed(Failure::UnknownTask(task.id()));
        };

        let mut state = lock(&entry.state);

        if state.is_final() {
            debug!("task {}: ignoring late completion of {}", task.id(), sub_task.id());
            return Completion::Pending;
        }

        let result = if *sub_count == BigUint::ZERO {
            warn!("task {}: sub-task {} has no models, count is zero", task.id(), sub_task.id());
            state.product = BigUint::ZERO;
            state.finish(Phase::EarlyZero);
            Completion::Done(BigUint::ZERO)
        } else if !state.outstanding.remove(&sub_task.id()) {
            debug!("task {}: ignoring repeated completion of {}", task.id(), sub_task.id());
            return Completion::Pending;
        } else {
            state.product *= sub_count;
            if state.outstanding.is_empty() {
                state.finish(Phase::Complete);
                debug!("task {}: complete with count {}", task.id(), state.product);
                Completion::Done(state.product.clone())
            } else {
                state.phase = Phase::Partial;
                return Completion::Pending;
            }
        };
        drop(state);

        self.release_context(entry.parent);
        result
    }

    /// Called by the host once it believes every sub-task has reported.
    ///
    /// `result` is the last [`Completion`] the host received for `task`. If it
    /// is still pending while sub-tasks remain outstanding, a completion was
    /// lost; this is reported as [`Failure::LostNotifications`] instead of
    /// waiting forever. The partial product is not a valid count and is not
    /// returned.
    pub fn all_children_done(&self, task: &Task, result: Completion) -> Completion {
        if !matches!(result, Completion::Pending) {
            return result;
        }
        let Some(entry) = self.entry(task.id()) else {
            return Completion::Failed(Failure::UnknownTask(task.id()));
        };
        let state = lock(&entry.state);
        if state.is_final() {
            Completion::Done(state.product.clone())
        } else {
            error!(
                "task {}: {} sub-task(s) outstanding after all children reported, lost completion",
                task.id(),
                state.outstanding.len()
            );
            Completion::Failed(Failure::LostNotifications {
                task: task.id(),
                outstanding: state.outstanding.len(),
            })
        }
    }

    /// Current phase of `task`, if it was factorized.
    pub fn phase(&self, task: TaskId) -> Option<Phase> {
        self.entry(task).map(|entry| lock(&entry.state).phase)
    }

    /// Drops all state kept for `task`, including a decomposition context
    /// cached for it as a parent.
    pub fn forget(&self, task: TaskId) {
        let entry = lock(&self.entries).remove(&task);
        if let Some(entry) = entry {
            if !lock(&entry.state).is_final() {
                self.release_context(entry.parent);
            }
        }
        lock(&self.contexts).remove(&task);
    }

    pub fn report(&self) -> AggregatorStats {
        AggregatorStats {
            invocations: self.invocations.load(Ordering::Relaxed),
            total_constraints: self.total_constraints.load(Ordering::Relaxed),
            factored_constraints: self.factored_constraints.load(Ordering::Relaxed),
        }
    }

    pub fn report_to(&self, reporter: &dyn Reporter) {
        let stats = self.report();
        let name = "CountAggregator";
        reporter.report(name, &format!("invocations = {}", stats.invocations));
        reporter.report(name, &format!("totalConstraints = {}", stats.total_constraints));
        reporter.report(name, &format!("factoredConstraints = {}", stats.factored_constraints));
    }
}
