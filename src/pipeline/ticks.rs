//! Tick Scheduler - Microtasks, animation frames and timers.
//!
//! Everything runs on one thread. Suspension points are explicit queues drained by
//! the host (or by tests) in the order a browser event loop would drain them:
//!
//! ```text
//! run_microtasks()        drain the microtask queue (tasks may queue more)
//! run_animation_frame()   run callbacks queued for the next frame
//! advance_time(ms)        move the virtual clock, firing due timers in order
//! run_until_idle()        all of the above until nothing is pending
//! ```
//!
//! Microtasks are drained after every frame callback and every timer.
//!
//! The next-tick queue can be held: while a transition is between its first and
//! second frame, `next_tick` callbacks wait until [`release_next_ticks`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Handle for cancelling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Timer {
    id: TimerId,
    deadline: u64,
    task: Task,
}

/// Upper bound on scheduler turns in [`run_until_idle`].
const MAX_IDLE_TURNS: usize = 10_000;

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
    static FRAME_QUEUE: RefCell<Vec<Task>> = const { RefCell::new(Vec::new()) };
    static TIMERS: RefCell<Vec<Timer>> = const { RefCell::new(Vec::new()) };
    static NOW_MS: Cell<u64> = const { Cell::new(0) };
    static NEXT_TIMER_ID: Cell<u64> = const { Cell::new(0) };
    static FRAME_COUNT: Cell<u64> = const { Cell::new(0) };
    static DOCUMENT_VISIBLE: Cell<bool> = const { Cell::new(true) };
    static TICK_QUEUE: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
    static HOLDING_TICKS: Cell<bool> = const { Cell::new(false) };
}

// =============================================================================
// Queueing
// =============================================================================

/// Queue a task to run at the next microtask checkpoint.
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    MICROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Queue a task for the next animation frame.
pub fn request_animation_frame(task: impl FnOnce() + 'static) {
    FRAME_QUEUE.with(|queue| queue.borrow_mut().push(Box::new(task)));
}

/// Run a task after `delay_ms` of virtual time.
pub fn set_timeout(task: impl FnOnce() + 'static, delay_ms: u64) -> TimerId {
    let id = NEXT_TIMER_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        TimerId(id)
    });
    let deadline = now_ms() + delay_ms;
    TIMERS.with(|timers| {
        timers.borrow_mut().push(Timer { id, deadline, task: Box::new(task) });
    });
    id
}

/// Cancel a pending timer. Returns whether it was still pending.
pub fn clear_timeout(id: TimerId) -> bool {
    TIMERS.with(|timers| {
        let mut timers = timers.borrow_mut();
        let before = timers.len();
        timers.retain(|t| t.id != id);
        timers.len() != before
    })
}

/// Frame-synced while the document is visible, a plain timer when backgrounded.
pub fn next_frame_or_timeout(task: impl FnOnce() + 'static) {
    if is_document_visible() {
        request_animation_frame(task);
    } else {
        set_timeout(task, 0);
    }
}

// =============================================================================
// Next Tick (holdable)
// =============================================================================

/// Run `task` after the current synchronous work, unless ticks are held.
pub fn next_tick(task: impl FnOnce() + 'static) {
    TICK_QUEUE.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
    if !HOLDING_TICKS.with(Cell::get) {
        queue_microtask(release_next_ticks);
    }
}

/// Hold next-tick callbacks until [`release_next_ticks`].
pub fn hold_next_ticks() {
    HOLDING_TICKS.with(|h| h.set(true));
}

/// Stop holding and run every queued next-tick callback.
pub fn release_next_ticks() {
    HOLDING_TICKS.with(|h| h.set(false));
    while let Some(task) = TICK_QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
        task();
    }
}

// =============================================================================
// Draining
// =============================================================================

/// Drain the microtask queue, including tasks queued while draining.
pub fn run_microtasks() {
    while let Some(task) = MICROTASKS.with(|queue| queue.borrow_mut().pop_front()) {
        task();
    }
}

/// Run every callback queued before this frame started.
///
/// Callbacks requested during the frame wait for the next one.
pub fn run_animation_frame() {
    let tasks = FRAME_QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
    FRAME_COUNT.with(|count| count.set(count.get() + 1));
    for task in tasks {
        task();
        run_microtasks();
    }
}

/// Advance the virtual clock by `ms`, firing due timers in deadline order.
pub fn advance_time(ms: u64) {
    let target = now_ms() + ms;
    while let Some(timer) = pop_due_timer(target) {
        NOW_MS.with(|now| now.set(timer.deadline.max(now.get())));
        (timer.task)();
        run_microtasks();
    }
    NOW_MS.with(|now| now.set(target));
}

/// Drain microtasks, frames and timers until nothing is pending.
pub fn run_until_idle() {
    for _ in 0..MAX_IDLE_TURNS {
        run_microtasks();
        if has_pending_frames() {
            run_animation_frame();
            continue;
        }
        match next_timer_deadline() {
            Some(deadline) => advance_time(deadline.saturating_sub(now_ms())),
            None => return,
        }
    }
    tracing::warn!(target: "spark_directives", "scheduler still busy after {MAX_IDLE_TURNS} turns");
}

fn pop_due_timer(target: u64) -> Option<Timer> {
    TIMERS.with(|timers| {
        let mut timers = timers.borrow_mut();
        // Earliest deadline first, insertion order breaks ties.
        let position = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= target)
            .min_by_key(|(_, t)| (t.deadline, t.id.0))
            .map(|(i, _)| i)?;
        Some(timers.remove(position))
    })
}

fn next_timer_deadline() -> Option<u64> {
    TIMERS.with(|timers| timers.borrow().iter().map(|t| t.deadline).min())
}

// =============================================================================
// Queries
// =============================================================================

/// Current virtual time in milliseconds.
pub fn now_ms() -> u64 {
    NOW_MS.with(Cell::get)
}

/// Number of animation frames run so far.
pub fn frame_count() -> u64 {
    FRAME_COUNT.with(Cell::get)
}

pub fn has_pending_frames() -> bool {
    FRAME_QUEUE.with(|queue| !queue.borrow().is_empty())
}

pub fn pending_timer_count() -> usize {
    TIMERS.with(|timers| timers.borrow().len())
}

pub fn is_document_visible() -> bool {
    DOCUMENT_VISIBLE.with(Cell::get)
}

/// Mark the document visible (foreground tab) or hidden (background tab).
pub fn set_document_visible(visible: bool) {
    DOCUMENT_VISIBLE.with(|v| v.set(visible));
}

pub fn is_holding_next_ticks() -> bool {
    HOLDING_TICKS.with(Cell::get)
}

/// Reset all scheduler state (for testing).
pub fn reset_scheduler() {
    MICROTASKS.with(|queue| queue.borrow_mut().clear());
    FRAME_QUEUE.with(|queue| queue.borrow_mut().clear());
    TIMERS.with(|timers| timers.borrow_mut().clear());
    NOW_MS.with(|now| now.set(0));
    NEXT_TIMER_ID.with(|next| next.set(0));
    FRAME_COUNT.with(|count| count.set(0));
    DOCUMENT_VISIBLE.with(|v| v.set(true));
    TICK_QUEUE.with(|queue| queue.borrow_mut().clear());
    HOLDING_TICKS.with(|h| h.set(false));
}
