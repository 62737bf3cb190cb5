//! Node Arrays - Parallel columns holding all node state.
//!
//! Each array index corresponds to one node. Nodes write directly to these
//! columns; the tree, style and lifecycle code read them back by index.
//!
//! # Array Categories
//!
//! - **core**: Tag, parent, children, text, template content
//! - **attrs**: Attributes, classes, inline styles

pub mod attrs;
pub mod core;

use std::cell::RefCell;

use self::attrs as attr_arrays;
use self::core as core_arrays;

/// One growable column of per-node values.
pub(crate) struct Column<T: Default>(RefCell<Vec<T>>);

impl<T: Default> Column<T> {
    pub(crate) const fn new() -> Self {
        Self(RefCell::new(Vec::new()))
    }

    pub(crate) fn ensure(&self, index: usize) {
        let mut values = self.0.borrow_mut();
        if values.len() <= index {
            values.resize_with(index + 1, T::default);
        }
    }

    pub(crate) fn clear(&self, index: usize) {
        if let Some(slot) = self.0.borrow_mut().get_mut(index) {
            *slot = T::default();
        }
    }

    pub(crate) fn reset(&self) {
        self.0.borrow_mut().clear();
    }

    /// Read the value at `index`; out-of-range indices read the default.
    pub(crate) fn read<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> R {
        let values = self.0.borrow();
        match values.get(index) {
            Some(value) => f(value),
            None => f(&T::default()),
        }
    }

    pub(crate) fn write<R>(&self, index: usize, f: impl FnOnce(&mut T) -> R) -> R {
        self.ensure(index);
        let mut values = self.0.borrow_mut();
        f(&mut values[index])
    }
}

/// Ensure all arrays have capacity for the given index.
///
/// Called by registry when allocating.
pub fn ensure_all_capacity(index: usize) {
    core_arrays::ensure_capacity(index);
    attr_arrays::ensure_capacity(index);
}

/// Clear all array values at an index.
///
/// Called by registry when releasing.
pub fn clear_all_at_index(index: usize) {
    core_arrays::clear_at_index(index);
    attr_arrays::clear_at_index(index);
}

/// Reset all parallel arrays to release memory.
pub fn reset_all_arrays() {
    core_arrays::reset();
    attr_arrays::reset();
}
