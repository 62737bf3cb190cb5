//! Transition State Machine - Cancellable, frame-sequenced phase runner.
//!
//! ```text
//! perform_transition
//!   ├─ start + during           (one batch, now)          Idle → Started
//!   ├─ frame 1: read timing, before                       → BeforeReached
//!   ├─ frame 2: end, release held ticks, arm timer        → EndReached
//!   └─ timer (duration + delay): finish                   → Finished
//!
//! cancel (any time): before-cancel hooks, then finish      → Cancelled
//! finish (exactly once): run unreached before/end, after, cleanup if connected
//! ```
//!
//! A node has at most one run in flight: starting a new one cancels the previous
//! run synchronously first.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::engine::{computed_style, is_connected, Undo};
use crate::pipeline::{
    clear_timeout, hold_next_ticks, mutate_dom, release_next_ticks, request_animation_frame,
    set_timeout, TimerId,
};
use crate::types::{NodeIndex, Value};

use super::descriptor::{is_empty_value, Phases, TransitionMode};
use super::{active_transition, clear_active_transition, descriptor, set_active_transition};

/// Caller hook (`before` / `after`).
pub type Hook = Box<dyn FnOnce()>;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Idle,
    Started,
    BeforeReached,
    EndReached,
    Finished,
    Cancelled,
}

impl TransitionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// The six phase callbacks of one run.
pub struct TransitionStages {
    pub start: Hook,
    pub during: Hook,
    pub before: Hook,
    pub end: Hook,
    pub after: Hook,
    pub cleanup: Hook,
}

#[derive(Default)]
struct StageSlots {
    start: Option<Hook>,
    during: Option<Hook>,
    before: Option<Hook>,
    end: Option<Hook>,
    after: Option<Hook>,
    cleanup: Option<Hook>,
}

struct Run {
    node: NodeIndex,
    state: Cell<TransitionState>,
    interrupted: Cell<bool>,
    reached_before: Cell<bool>,
    reached_end: Cell<bool>,
    cancel_called: Cell<bool>,
    finish_called: Cell<bool>,
    stages: RefCell<StageSlots>,
    before_cancels: RefCell<VecDeque<Hook>>,
    timer: Cell<Option<TimerId>>,
}

/// Handle to one transition run.
#[derive(Clone)]
pub struct TransitionHandle {
    run: Rc<Run>,
}

impl std::fmt::Debug for TransitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionHandle")
            .field("node", &self.run.node)
            .field("state", &self.run.state.get())
            .finish()
    }
}

impl TransitionHandle {
    fn new(node: NodeIndex, stages: TransitionStages) -> Self {
        let slots = StageSlots {
            start: Some(stages.start),
            during: Some(stages.during),
            before: Some(stages.before),
            end: Some(stages.end),
            after: Some(stages.after),
            cleanup: Some(stages.cleanup),
        };
        Self {
            run: Rc::new(Run {
                node,
                state: Cell::new(TransitionState::Idle),
                interrupted: Cell::new(false),
                reached_before: Cell::new(false),
                reached_end: Cell::new(false),
                cancel_called: Cell::new(false),
                finish_called: Cell::new(false),
                stages: RefCell::new(slots),
                before_cancels: RefCell::new(VecDeque::new()),
                timer: Cell::new(None),
            }),
        }
    }

    /// A run that already completed (nothing to animate).
    fn completed(node: NodeIndex) -> Self {
        let handle = Self::new(node, noop_stages());
        handle.run.finish_called.set(true);
        handle.run.interrupted.set(true);
        handle.run.state.set(TransitionState::Finished);
        handle
    }

    pub fn node(&self) -> NodeIndex {
        self.run.node
    }

    pub fn state(&self) -> TransitionState {
        self.run.state.get()
    }

    pub fn is_active(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.run, &other.run)
    }

    /// Register a hook that runs if (and only if) this run gets cancelled.
    pub fn before_cancel(&self, hook: impl FnOnce() + 'static) {
        if self.is_active() {
            self.run.before_cancels.borrow_mut().push_back(Box::new(hook));
        }
    }

    /// Interrupt the run: before-cancel hooks, then [`finish`](Self::finish).
    ///
    /// Only the first call has any effect.
    pub fn cancel(&self) {
        if self.run.cancel_called.replace(true) {
            return;
        }
        if !self.run.finish_called.get() {
            self.run.state.set(TransitionState::Cancelled);
        }
        while let Some(hook) = self.run.before_cancels.borrow_mut().pop_front() {
            hook();
        }
        self.finish();
    }

    /// Fast-forward to the end. Only the first call has any effect.
    pub fn finish(&self) {
        let run = &self.run;
        if run.finish_called.replace(true) {
            return;
        }
        if let Some(timer) = run.timer.take() {
            clear_timeout(timer);
        }

        mutate_dom(|| {
            run.interrupted.set(true);

            if !run.reached_before.get() {
                self.run_stage(|s| s.before.take());
            }
            if !run.reached_end.get() {
                self.run_stage(|s| s.end.take());
                release_next_ticks();
            }
            self.run_stage(|s| s.after.take());

            // `after` may have detached the node.
            if is_connected(run.node) {
                self.run_stage(|s| s.cleanup.take());
            }

            if active_transition(run.node).is_some_and(|active| active.ptr_eq(self)) {
                clear_active_transition(run.node);
            }
        });

        if !run.state.get().is_terminal() {
            run.state.set(TransitionState::Finished);
        }
        tracing::trace!(target: "spark_directives", node = run.node, state = ?run.state.get(), "transition finished");
    }

    /// Take a stage out of its slot and run it (outside the borrow).
    fn run_stage(&self, take: impl FnOnce(&mut StageSlots) -> Option<Hook>) {
        let stage = take(&mut self.run.stages.borrow_mut());
        if let Some(stage) = stage {
            stage();
        }
    }

    /// Stop tracking a run whose node is gone, without running any stage.
    pub(crate) fn abandon(&self) {
        let run = &self.run;
        if run.finish_called.replace(true) {
            return;
        }
        if let Some(timer) = run.timer.take() {
            clear_timeout(timer);
        }
        run.interrupted.set(true);
        if !run.reached_end.get() {
            release_next_ticks();
        }
        run.before_cancels.borrow_mut().clear();
        *run.stages.borrow_mut() = StageSlots::default();
        run.state.set(TransitionState::Cancelled);
    }
}

fn noop_stages() -> TransitionStages {
    TransitionStages {
        start: Box::new(|| {}),
        during: Box::new(|| {}),
        before: Box::new(|| {}),
        end: Box::new(|| {}),
        after: Box::new(|| {}),
        cleanup: Box::new(|| {}),
    }
}

// =============================================================================
// Timing
// =============================================================================

/// Parse a computed time (`"0.15s"`, `"150ms"`, `"0.1s, 0.3s"`) into milliseconds.
///
/// Only the first comma-separated entry counts.
pub fn parse_time_ms(text: &str) -> u64 {
    let first = text.split(',').next().unwrap_or("").trim();
    let ms = if let Some(ms) = first.strip_suffix("ms") {
        ms.trim().parse::<f64>().unwrap_or(0.0)
    } else if let Some(seconds) = first.strip_suffix('s') {
        seconds.trim().parse::<f64>().unwrap_or(0.0) * 1000.0
    } else {
        first.parse::<f64>().unwrap_or(0.0) * 1000.0
    };
    if ms.is_finite() && ms > 0.0 { ms.round() as u64 } else { 0 }
}

fn read_timing(node: NodeIndex) -> (u64, u64) {
    let read = |property: &str| computed_style(node, property).map_or(0, |text| parse_time_ms(&text));
    let mut duration = read("transition-duration");
    let delay = read("transition-delay");
    if duration == 0 {
        duration = read("animation-duration");
    }
    (duration, delay)
}

// =============================================================================
// Running
// =============================================================================

/// Run `stages` on `node`, cancelling any run already in flight there.
pub fn perform_transition(node: NodeIndex, stages: TransitionStages) -> TransitionHandle {
    if let Some(previous) = active_transition(node) {
        previous.cancel();
    }

    let handle = TransitionHandle::new(node, stages);
    set_active_transition(node, handle.clone());

    mutate_dom(|| {
        handle.run_stage(|s| s.start.take());
        handle.run_stage(|s| s.during.take());
    });
    handle.run.state.set(TransitionState::Started);
    tracing::trace!(target: "spark_directives", node, "transition started");

    hold_next_ticks();

    let first = handle.clone();
    request_animation_frame(move || {
        if first.run.interrupted.get() {
            return;
        }
        let (duration, delay) = read_timing(node);

        mutate_dom(|| first.run_stage(|s| s.before.take()));
        first.run.reached_before.set(true);
        if first.run.interrupted.get() {
            return;
        }
        first.run.state.set(TransitionState::BeforeReached);

        let second = first.clone();
        request_animation_frame(move || {
            if second.run.interrupted.get() {
                return;
            }
            mutate_dom(|| second.run_stage(|s| s.end.take()));
            release_next_ticks();

            let finisher = second.clone();
            let timer = set_timeout(move || finisher.finish(), duration + delay);
            second.run.timer.set(Some(timer));
            second.run.reached_end.set(true);
            second.run.state.set(TransitionState::EndReached);
            tracing::trace!(target: "spark_directives", node, duration, delay, "transition end applied");
        });
    });

    handle
}

/// Transition `node` between phase values applied with `mode`.
///
/// With every phase empty, `before` and `after` run immediately.
pub fn transition(
    node: NodeIndex,
    mode: TransitionMode,
    phases: &Phases,
    before: Option<Hook>,
    after: Option<Hook>,
) -> TransitionHandle {
    if let Some(previous) = active_transition(node) {
        previous.cancel();
    }

    let before = before.unwrap_or_else(|| Box::new(|| {}));
    let after = after.unwrap_or_else(|| Box::new(|| {}));

    if is_empty_value(&phases.start) && is_empty_value(&phases.during) && is_empty_value(&phases.end) {
        before();
        after();
        return TransitionHandle::completed(node);
    }

    let undo_start: Rc<RefCell<Option<Undo>>> = Rc::new(RefCell::new(None));
    let undo_during: Rc<RefCell<Option<Undo>>> = Rc::new(RefCell::new(None));
    let undo_end: Rc<RefCell<Option<Undo>>> = Rc::new(RefCell::new(None));

    let apply = move |value: Value, slot: Rc<RefCell<Option<Undo>>>| -> Hook {
        Box::new(move || {
            let undo = mode.apply(node, &value);
            *slot.borrow_mut() = Some(undo);
        })
    };
    let take_and_run = |slot: &Rc<RefCell<Option<Undo>>>| {
        let undo = slot.borrow_mut().take();
        if let Some(undo) = undo {
            undo();
        }
    };

    let start = apply(phases.start.clone(), undo_start.clone());
    let during = apply(phases.during.clone(), undo_during.clone());
    let apply_end = apply(phases.end.clone(), undo_end.clone());

    let end_undo_start = undo_start.clone();
    let end: Hook = Box::new(move || {
        take_and_run(&end_undo_start);
        apply_end();
    });
    let cleanup: Hook = Box::new(move || {
        take_and_run(&undo_during);
        take_and_run(&undo_end);
    });

    perform_transition(node, TransitionStages { start, during, before, end, after, cleanup })
}

/// Run the node's enter transition. `None` when the node has no descriptor.
pub fn transition_in(node: NodeIndex, before: Option<Hook>, after: Option<Hook>) -> Option<TransitionHandle> {
    let descriptor = descriptor(node)?;
    Some(transition(node, descriptor.mode, &descriptor.enter, before, after))
}

/// Run the node's leave transition. `None` when the node has no descriptor.
pub fn transition_out(node: NodeIndex, before: Option<Hook>, after: Option<Hook>) -> Option<TransitionHandle> {
    let descriptor = descriptor(node)?;
    Some(transition(node, descriptor.mode, &descriptor.leave, before, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{append_child, create_element, document_root, get_style, set_style};
    use crate::pipeline::{advance_time, is_holding_next_ticks, run_animation_frame};
    use crate::runtime::reset_all;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn logging_stages(log: &Log) -> TransitionStages {
        let hook = |name: &'static str| -> Hook {
            let log = log.clone();
            Box::new(move || log.borrow_mut().push(name))
        };
        TransitionStages {
            start: hook("start"),
            during: hook("during"),
            before: hook("before"),
            end: hook("end"),
            after: hook("after"),
            cleanup: hook("cleanup"),
        }
    }

    fn connected_node() -> NodeIndex {
        reset_all();
        let node = create_element("div");
        append_child(document_root(), node);
        node
    }

    #[test]
    fn test_phases_follow_frames_and_timer() {
        let node = connected_node();
        set_style(node, "transition-duration", "0.1s");
        let log: Log = Rc::default();

        let handle = perform_transition(node, logging_stages(&log));
        assert_eq!(*log.borrow(), vec!["start", "during"]);
        assert_eq!(handle.state(), TransitionState::Started);
        assert!(is_holding_next_ticks());

        run_animation_frame();
        assert_eq!(*log.borrow(), vec!["start", "during", "before"]);
        assert_eq!(handle.state(), TransitionState::BeforeReached);

        run_animation_frame();
        assert_eq!(handle.state(), TransitionState::EndReached);
        assert!(!is_holding_next_ticks());

        advance_time(99);
        assert!(handle.is_active());
        advance_time(1);
        assert_eq!(*log.borrow(), vec!["start", "during", "before", "end", "after", "cleanup"]);
        assert_eq!(handle.state(), TransitionState::Finished);
        assert!(active_transition(node).is_none());
    }

    #[test]
    fn test_cancel_fast_forwards_exactly_once() {
        let node = connected_node();
        let log: Log = Rc::default();
        let handle = perform_transition(node, logging_stages(&log));

        let cancels = Rc::new(Cell::new(0));
        let counter = cancels.clone();
        handle.before_cancel(move || counter.set(counter.get() + 1));

        handle.cancel();
        handle.cancel();
        handle.finish();
        run_animation_frame();
        run_animation_frame();

        assert_eq!(*log.borrow(), vec!["start", "during", "before", "end", "after", "cleanup"]);
        assert_eq!(cancels.get(), 1);
        assert_eq!(handle.state(), TransitionState::Cancelled);
        assert!(!is_holding_next_ticks());
    }

    #[test]
    fn test_new_run_cancels_previous() {
        let node = connected_node();
        let first_log: Log = Rc::default();
        let second_log: Log = Rc::default();

        let first = perform_transition(node, logging_stages(&first_log));
        run_animation_frame();
        let second = perform_transition(node, logging_stages(&second_log));

        assert_eq!(first.state(), TransitionState::Cancelled);
        assert_eq!(*first_log.borrow(), vec!["start", "during", "before", "end", "after", "cleanup"]);
        assert!(active_transition(node).is_some_and(|active| active.ptr_eq(&second)));
    }

    #[test]
    fn test_detached_node_skips_cleanup() {
        let node = connected_node();
        let log: Log = Rc::default();
        let mut stages = logging_stages(&log);
        let after_log = log.clone();
        stages.after = Box::new(move || {
            after_log.borrow_mut().push("after");
            crate::engine::remove(node);
        });

        perform_transition(node, stages).finish();
        assert_eq!(*log.borrow(), vec!["start", "during", "before", "end", "after"]);
    }

    #[test]
    fn test_style_transition_restores_node() {
        let node = connected_node();
        set_style(node, "opacity", "0.5");
        let phases = Phases {
            start: serde_json::json!({"opacity": 0}),
            during: serde_json::json!({"transitionDuration": "0.2s"}),
            end: serde_json::json!({"opacity": 1}),
        };

        let handle = transition(node, TransitionMode::Styles, &phases, None, None);
        assert_eq!(get_style(node, "opacity").as_deref(), Some("0"));

        run_animation_frame();
        run_animation_frame();
        assert_eq!(get_style(node, "opacity").as_deref(), Some("1"));

        advance_time(200);
        assert_eq!(handle.state(), TransitionState::Finished);
        assert_eq!(get_style(node, "opacity").as_deref(), Some("0.5"));
        assert_eq!(get_style(node, "transition-duration"), None);
    }

    #[test]
    fn test_empty_phases_run_hooks_immediately() {
        let node = connected_node();
        let log: Log = Rc::default();
        let (b, a) = (log.clone(), log.clone());
        let phases = Phases {
            start: Value::Object(Default::default()),
            during: Value::Object(Default::default()),
            end: Value::Object(Default::default()),
        };

        let handle = transition(
            node,
            TransitionMode::Styles,
            &phases,
            Some(Box::new(move || b.borrow_mut().push("before"))),
            Some(Box::new(move || a.borrow_mut().push("after"))),
        );
        assert_eq!(*log.borrow(), vec!["before", "after"]);
        assert_eq!(handle.state(), TransitionState::Finished);
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time_ms("0.15s"), 150);
        assert_eq!(parse_time_ms("150ms"), 150);
        assert_eq!(parse_time_ms("0.1s, 0.3s"), 100);
        assert_eq!(parse_time_ms("garbage"), 0);
        assert_eq!(parse_time_ms("0s"), 0);
    }
}
