//! Scheduling Pipeline
//!
//! The two scheduling collaborators every directive funnels through:
//!
//! - [`batch`] - `mutate_dom`: structural mutations coalesce into one layout pass
//!   and are hidden from mutation observation
//! - [`ticks`] - microtasks, animation frames, virtual-clock timers and the holdable
//!   next-tick queue
//!
//! ## Ordering
//!
//! ```text
//! synchronous work → microtasks → frame callbacks (microtasks after each) → timers
//! ```
//!
//! Nothing here blocks; the host decides when each queue is drained.

pub mod batch;
pub mod ticks;

// Re-exports
pub use batch::{is_mutating, layout_pass_count, mutate_dom, take_observed_mutations, Mutation};
pub use ticks::{
    advance_time, clear_timeout, hold_next_ticks, is_document_visible, is_holding_next_ticks,
    next_frame_or_timeout, next_tick, now_ms, queue_microtask, release_next_ticks,
    request_animation_frame, run_animation_frame, run_microtasks, run_until_idle,
    set_document_visible, set_timeout, TimerId,
};
