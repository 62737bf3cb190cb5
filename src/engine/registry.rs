//! Node Registry - Index allocation for parallel arrays.
//!
//! Manages the lifecycle of node indices:
//! - Free index pool for O(1) reuse
//! - Allocated set for liveness checks
//! - Destroy callbacks so side tables keyed by index never outlive their node

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use super::arrays;
use super::arrays::core;

// =============================================================================
// Registry State
// =============================================================================

thread_local! {
    /// Set of currently allocated indices.
    static ALLOCATED_INDICES: RefCell<BTreeSet<usize>> = const { RefCell::new(BTreeSet::new()) };

    /// Pool of freed indices for reuse.
    static FREE_INDICES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };

    /// Next index to allocate if pool is empty.
    static NEXT_INDEX: RefCell<usize> = const { RefCell::new(0) };

    /// Destroy callbacks registered per index.
    static DESTROY_CALLBACKS: RefCell<HashMap<usize, Vec<Box<dyn FnOnce()>>>> = RefCell::new(HashMap::new());
}

// =============================================================================
// Index Allocation
// =============================================================================

/// Allocate an index for a new node with the given tag.
pub fn allocate_index(tag: &str) -> usize {
    // Reuse free index or allocate new
    let index = FREE_INDICES.with(|free| {
        let mut free = free.borrow_mut();
        if let Some(index) = free.pop() {
            index
        } else {
            NEXT_INDEX.with(|next| {
                let mut next = next.borrow_mut();
                let index = *next;
                *next += 1;
                index
            })
        }
    });

    ALLOCATED_INDICES.with(|set| {
        set.borrow_mut().insert(index);
    });

    // Ensure arrays have capacity for this index
    arrays::ensure_all_capacity(index);
    core::set_tag(index, tag);

    index
}

/// Release an index back to the pool.
///
/// Also recursively releases all children and the template content fragment.
/// The node must already be detached; releasing does not run directive cleanups.
pub fn release_index(index: usize) {
    if !is_allocated(index) {
        return;
    }

    // FIRST: release children (collected up front, the release mutates them)
    for child in core::get_children(index) {
        release_index(child);
    }
    if let Some(content) = core::get_template_content(index) {
        release_index(content);
    }

    // Run destroy callbacks before cleanup
    run_destroy_callbacks(index);

    ALLOCATED_INDICES.with(|set| {
        set.borrow_mut().remove(&index);
    });

    // Clear all array values at this index
    arrays::clear_all_at_index(index);

    // Return to pool for reuse
    FREE_INDICES.with(|free| {
        free.borrow_mut().push(index);
    });
}

// =============================================================================
// Destroy Callbacks
// =============================================================================

/// Register a callback to run when the node at `index` is released.
pub fn on_destroy(index: usize, callback: impl FnOnce() + 'static) {
    DESTROY_CALLBACKS.with(|callbacks| {
        callbacks
            .borrow_mut()
            .entry(index)
            .or_default()
            .push(Box::new(callback));
    });
}

/// Run and clear destroy callbacks for an index.
fn run_destroy_callbacks(index: usize) {
    let callbacks = DESTROY_CALLBACKS.with(|callbacks| {
        callbacks.borrow_mut().remove(&index)
    });
    if let Some(callbacks) = callbacks {
        for callback in callbacks {
            callback();
        }
    }
}

// =============================================================================
// Lookups
// =============================================================================

/// Get all currently allocated indices in ascending order.
pub fn get_allocated_indices() -> Vec<usize> {
    ALLOCATED_INDICES.with(|set| set.borrow().iter().copied().collect())
}

/// Check if an index is currently allocated.
pub fn is_allocated(index: usize) -> bool {
    ALLOCATED_INDICES.with(|set| set.borrow().contains(&index))
}

/// Get the count of currently allocated nodes.
pub fn get_allocated_count() -> usize {
    ALLOCATED_INDICES.with(|set| set.borrow().len())
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Reset all registry state (for testing).
pub fn reset_registry() {
    ALLOCATED_INDICES.with(|set| set.borrow_mut().clear());
    FREE_INDICES.with(|free| free.borrow_mut().clear());
    NEXT_INDEX.with(|next| *next.borrow_mut() = 0);
    DESTROY_CALLBACKS.with(|callbacks| callbacks.borrow_mut().clear());
    arrays::reset_all_arrays();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_index() {
        reset_registry();

        let idx1 = allocate_index("div");
        let idx2 = allocate_index("span");

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(core::get_tag(idx2), "span");

        assert!(is_allocated(0));
        assert!(is_allocated(1));
        assert!(!is_allocated(2));

        assert_eq!(get_allocated_count(), 2);
    }

    #[test]
    fn test_release_and_reuse() {
        reset_registry();

        let idx1 = allocate_index("div");
        let idx2 = allocate_index("div");

        release_index(idx1);
        assert!(!is_allocated(idx1));
        assert!(is_allocated(idx2));

        // Should reuse the freed index
        let idx3 = allocate_index("p");
        assert_eq!(idx3, idx1);
        assert_eq!(core::get_tag(idx3), "p");
    }

    #[test]
    fn test_release_is_recursive() {
        reset_registry();

        let parent = allocate_index("ul");
        let child = allocate_index("li");
        core::set_parent_index(child, Some(parent));
        core::with_children_mut(parent, |children| children.push(child));

        release_index(parent);
        assert!(!is_allocated(child));
        assert_eq!(get_allocated_count(), 0);
    }

    #[test]
    fn test_destroy_callback() {
        use std::cell::Cell;
        use std::rc::Rc;

        reset_registry();

        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();

        let idx = allocate_index("div");
        on_destroy(idx, move || {
            called_clone.set(true);
        });

        assert!(!called.get());
        release_index(idx);
        assert!(called.get());
    }
}
