//! Mutation Batcher - Coalesced structural DOM operations.
//!
//! Every structural change to the node tree is recorded here. Changes made inside
//! [`mutate_dom`] are suppressed from observation and coalesce into a single layout
//! pass when the outermost batch closes. Changes made outside any batch count as
//! their own layout pass and are queued for the runtime to observe, exactly like a
//! mutation observer would see them.
//!
//! ```text
//! mutate_dom(|| { insert; insert; remove })   → 1 layout pass, nothing observed
//! insert (outside)                            → 1 layout pass, Added queued
//! ```

use std::cell::{Cell, RefCell};

use crate::types::NodeIndex;

/// A structural change seen outside of [`mutate_dom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Added { node: NodeIndex, parent: NodeIndex },
    Removed { node: NodeIndex, parent: NodeIndex },
}

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static DIRTY: Cell<bool> = const { Cell::new(false) };
    static LAYOUT_PASSES: Cell<usize> = const { Cell::new(0) };
    static OBSERVED: RefCell<Vec<Mutation>> = const { RefCell::new(Vec::new()) };
}

/// Closes a batch even if the batched closure panics.
struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = DEPTH.with(|d| {
            let depth = d.get().saturating_sub(1);
            d.set(depth);
            depth
        });
        if depth == 0 && DIRTY.with(|d| d.replace(false)) {
            LAYOUT_PASSES.with(|p| p.set(p.get() + 1));
        }
    }
}

/// Run `f` as one batch of structural mutations.
///
/// Nested calls join the outermost batch.
pub fn mutate_dom<R>(f: impl FnOnce() -> R) -> R {
    DEPTH.with(|d| d.set(d.get() + 1));
    let _guard = BatchGuard;
    f()
}

/// Whether a batch is currently open.
pub fn is_mutating() -> bool {
    DEPTH.with(|d| d.get() > 0)
}

/// Record a structural mutation.
pub(crate) fn record(mutation: Mutation) {
    if is_mutating() {
        DIRTY.with(|d| d.set(true));
    } else {
        LAYOUT_PASSES.with(|p| p.set(p.get() + 1));
        OBSERVED.with(|queue| queue.borrow_mut().push(mutation));
    }
}

/// Drain the mutations made outside of any batch.
pub fn take_observed_mutations() -> Vec<Mutation> {
    OBSERVED.with(|queue| std::mem::take(&mut *queue.borrow_mut()))
}

/// Number of layout passes so far (one per closed batch or unbatched mutation).
pub fn layout_pass_count() -> usize {
    LAYOUT_PASSES.with(|p| p.get())
}

/// Reset batch state (for testing).
pub fn reset_batch() {
    DEPTH.with(|d| d.set(0));
    DIRTY.with(|d| d.set(false));
    LAYOUT_PASSES.with(|p| p.set(0));
    OBSERVED.with(|queue| queue.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batched_mutations_coalesce() {
        reset_batch();

        mutate_dom(|| {
            record(Mutation::Added { node: 1, parent: 0 });
            mutate_dom(|| record(Mutation::Added { node: 2, parent: 0 }));
            record(Mutation::Removed { node: 1, parent: 0 });
        });

        assert_eq!(layout_pass_count(), 1);
        assert!(take_observed_mutations().is_empty(), "batched mutations are not observed");
        assert!(!is_mutating());
    }

    #[test]
    fn test_unbatched_mutations_are_observed() {
        reset_batch();

        record(Mutation::Added { node: 3, parent: 0 });
        record(Mutation::Removed { node: 3, parent: 0 });

        assert_eq!(layout_pass_count(), 2);
        assert_eq!(
            take_observed_mutations(),
            vec![
                Mutation::Added { node: 3, parent: 0 },
                Mutation::Removed { node: 3, parent: 0 },
            ]
        );
    }

    #[test]
    fn test_empty_batch_is_not_a_pass() {
        reset_batch();
        mutate_dom(|| {});
        assert_eq!(layout_pass_count(), 0);
    }
}
