//! Core Arrays - Structural node properties.
//!
//! - tag: Element name (`div`, `template`, ...)
//! - parent: Parent index, `None` for detached roots
//! - children: Ordered child indices
//! - text: Text content
//! - template content: Detached fragment root cloned by `for`/`if`

use super::Column;

// =============================================================================
// Arrays
// =============================================================================

thread_local! {
    static TAG: Column<String> = const { Column::new() };
    static PARENT: Column<Option<usize>> = const { Column::new() };
    static CHILDREN: Column<Vec<usize>> = const { Column::new() };
    static TEXT: Column<String> = const { Column::new() };
    static TEMPLATE_CONTENT: Column<Option<usize>> = const { Column::new() };
}

// =============================================================================
// Capacity Management
// =============================================================================

/// Ensure arrays have capacity for the given index.
pub fn ensure_capacity(index: usize) {
    TAG.with(|col| col.ensure(index));
    PARENT.with(|col| col.ensure(index));
    CHILDREN.with(|col| col.ensure(index));
    TEXT.with(|col| col.ensure(index));
    TEMPLATE_CONTENT.with(|col| col.ensure(index));
}

/// Clear values at index.
pub fn clear_at_index(index: usize) {
    TAG.with(|col| col.clear(index));
    PARENT.with(|col| col.clear(index));
    CHILDREN.with(|col| col.clear(index));
    TEXT.with(|col| col.clear(index));
    TEMPLATE_CONTENT.with(|col| col.clear(index));
}

/// Reset all arrays.
pub fn reset() {
    TAG.with(|col| col.reset());
    PARENT.with(|col| col.reset());
    CHILDREN.with(|col| col.reset());
    TEXT.with(|col| col.reset());
    TEMPLATE_CONTENT.with(|col| col.reset());
}

// =============================================================================
// Tag
// =============================================================================

pub fn get_tag(index: usize) -> String {
    TAG.with(|col| col.read(index, Clone::clone))
}

pub fn set_tag(index: usize, tag: &str) {
    TAG.with(|col| col.write(index, |t| *t = tag.to_ascii_lowercase()));
}

// =============================================================================
// Parent / Children
// =============================================================================

pub fn get_parent_index(index: usize) -> Option<usize> {
    PARENT.with(|col| col.read(index, |p| *p))
}

pub fn set_parent_index(index: usize, parent: Option<usize>) {
    PARENT.with(|col| col.write(index, |p| *p = parent));
}

pub fn get_children(index: usize) -> Vec<usize> {
    CHILDREN.with(|col| col.read(index, Clone::clone))
}

pub fn with_children_mut<R>(index: usize, f: impl FnOnce(&mut Vec<usize>) -> R) -> R {
    CHILDREN.with(|col| col.write(index, f))
}

// =============================================================================
// Text
// =============================================================================

pub fn get_text(index: usize) -> String {
    TEXT.with(|col| col.read(index, Clone::clone))
}

pub fn set_text(index: usize, text: &str) {
    TEXT.with(|col| col.write(index, |t| {
        t.clear();
        t.push_str(text);
    }));
}

// =============================================================================
// Template Content
// =============================================================================

pub fn get_template_content(index: usize) -> Option<usize> {
    TEMPLATE_CONTENT.with(|col| col.read(index, |c| *c))
}

pub fn set_template_content(index: usize, content: Option<usize>) {
    TEMPLATE_CONTENT.with(|col| col.write(index, |c| *c = content));
}
