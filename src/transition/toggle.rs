//! Show/hide toggling with nested hide ordering.
//!
//! Hiding a node creates a [`HideTask`] that completes when its leave transition
//! finishes (or immediately without a transition). One microtask later the node
//! looks for the closest ancestor that is itself hiding:
//!
//! ```text
//! ancestor hiding?  ── yes ──▶ register as that ancestor's child task
//!        │
//!        no ──▶ next tick: cascade
//!
//! cascade(node) = wait for own task + cascade(child) for every child,
//!                 then run the node's hide if its own task completed
//! ```
//!
//! A cancelled task (the node was shown again mid-transition) never hides its
//! node, but still counts as settled for its ancestor and its siblings.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::parent;
use crate::pipeline::{next_frame_or_timeout, next_tick, queue_microtask};
use crate::types::NodeIndex;

use super::machine::{transition_in, transition_out, Hook};
use super::{active_transition, descriptor};

/// How a hide request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideOutcome {
    Pending,
    Completed,
    Cancelled,
}

/// One pending hide: the node's own leave plus the children waiting on it.
struct HideTask {
    outcome: Cell<HideOutcome>,
    hide: RefCell<Option<Hook>>,
    children: RefCell<Vec<(NodeIndex, Rc<HideTask>)>>,
    waiters: RefCell<Vec<Hook>>,
}

impl HideTask {
    fn new(hide: Hook) -> Rc<Self> {
        Rc::new(Self {
            outcome: Cell::new(HideOutcome::Pending),
            hide: RefCell::new(Some(hide)),
            children: RefCell::new(Vec::new()),
            waiters: RefCell::new(Vec::new()),
        })
    }

    fn complete(&self) {
        self.settle(HideOutcome::Completed);
    }

    fn cancel(&self) {
        self.settle(HideOutcome::Cancelled);
    }

    /// Only a pending task can settle.
    fn settle(&self, outcome: HideOutcome) {
        if self.outcome.get() != HideOutcome::Pending {
            return;
        }
        self.outcome.set(outcome);
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waiter in waiters {
            waiter();
        }
    }

    fn when_settled(&self, waiter: Hook) {
        if self.outcome.get() == HideOutcome::Pending {
            self.waiters.borrow_mut().push(waiter);
        } else {
            waiter();
        }
    }
}

thread_local! {
    /// Nodes whose hide has not started cascading yet (ancestor lookup).
    static HIDING: RefCell<HashMap<NodeIndex, Rc<HideTask>>> = RefCell::new(HashMap::new());
    /// The latest hide task of each node.
    static LATEST: RefCell<HashMap<NodeIndex, Rc<HideTask>>> = RefCell::new(HashMap::new());
}

/// Outcome of the node's latest hide request.
pub fn hide_outcome(node: NodeIndex) -> Option<HideOutcome> {
    LATEST.with(|latest| latest.borrow().get(&node).map(|task| task.outcome.get()))
}

pub(super) fn forget_hide(node: NodeIndex) {
    HIDING.with(|hiding| hiding.borrow_mut().remove(&node));
    let task = LATEST.with(|latest| latest.borrow_mut().remove(&node));
    if let Some(task) = task {
        task.cancel();
    }
}

pub(super) fn reset_hides() {
    HIDING.with(|hiding| hiding.borrow_mut().clear());
    LATEST.with(|latest| latest.borrow_mut().clear());
}

fn closest_hide(node: NodeIndex) -> Option<Rc<HideTask>> {
    let mut current = parent(node);
    while let Some(ancestor) = current {
        let task = HIDING.with(|hiding| hiding.borrow().get(&ancestor).cloned());
        if task.is_some() {
            return task;
        }
        current = parent(ancestor);
    }
    None
}

// =============================================================================
// Toggle
// =============================================================================

/// Show or hide `node`, running its enter/leave transition when it has one.
///
/// Showing runs `show` as the enter transition's `before` hook, or on the next
/// frame when there is no enter transition. Hiding runs `hide` only after the
/// node's leave transition and every nested hide registered under it settle.
pub fn toggle_with_transitions(node: NodeIndex, value: bool, show: Hook, hide: Hook) {
    let descriptor = descriptor(node);

    if value {
        match descriptor {
            Some(d) if !d.enter.is_empty() => {
                transition_in(node, Some(show), None);
            }
            _ => {
                // A leave still in flight must not hide the node after this show.
                if let Some(active) = active_transition(node) {
                    active.cancel();
                }
                next_frame_or_timeout(show);
            }
        }
        return;
    }

    super::track(node);
    let task = HideTask::new(hide);
    HIDING.with(|hiding| hiding.borrow_mut().insert(node, task.clone()));
    let previous = LATEST.with(|latest| latest.borrow_mut().insert(node, task.clone()));
    if let Some(previous) = previous {
        previous.cancel();
    }

    if descriptor.is_some() {
        let completer = task.clone();
        transition_out(node, None, Some(Box::new(move || completer.complete())));
        if let Some(active) = active_transition(node) {
            let canceller = task.clone();
            active.before_cancel(move || canceller.cancel());
        }
    } else {
        task.complete();
    }

    queue_microtask(move || match closest_hide(node) {
        Some(ancestor) => ancestor.children.borrow_mut().push((node, task)),
        None => next_tick(move || hide_after_children(node, task, Box::new(|| {}))),
    });
}

/// Wait for the node's own task and all of its child cascades, then hide.
fn hide_after_children(node: NodeIndex, task: Rc<HideTask>, done: Hook) {
    HIDING.with(|hiding| {
        let mut hiding = hiding.borrow_mut();
        if hiding.get(&node).is_some_and(|current| Rc::ptr_eq(current, &task)) {
            hiding.remove(&node);
        }
    });

    let children = std::mem::take(&mut *task.children.borrow_mut());
    let remaining = Rc::new(Cell::new(children.len() + 1));
    let done = RefCell::new(Some(done));
    let owner = task.clone();
    let arrive: Rc<dyn Fn()> = Rc::new(move || {
        remaining.set(remaining.get() - 1);
        if remaining.get() > 0 {
            return;
        }
        if owner.outcome.get() == HideOutcome::Completed {
            let hide = owner.hide.borrow_mut().take();
            if let Some(hide) = hide {
                hide();
            }
        }
        tracing::trace!(target: "spark_directives", node, outcome = ?owner.outcome.get(), "hide settled");
        let done = done.borrow_mut().take();
        if let Some(done) = done {
            done();
        }
    });

    for (child, child_task) in children {
        let arrive = arrive.clone();
        hide_after_children(child, child_task, Box::new(move || arrive()));
    }
    task.when_settled(Box::new(move || arrive()));
}
