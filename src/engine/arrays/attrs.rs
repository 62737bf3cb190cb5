//! Attribute Arrays - Declarative node properties.
//!
//! - attributes: Ordered `(name, value)` pairs, names unique per node
//! - classes: Ordered class list, no duplicates
//! - styles: Ordered inline `(property, value)` pairs, kebab-case names

use super::Column;

thread_local! {
    static ATTRIBUTES: Column<Vec<(String, String)>> = const { Column::new() };
    static CLASSES: Column<Vec<String>> = const { Column::new() };
    static STYLES: Column<Vec<(String, String)>> = const { Column::new() };
}

/// Ensure arrays have capacity for the given index.
pub fn ensure_capacity(index: usize) {
    ATTRIBUTES.with(|col| col.ensure(index));
    CLASSES.with(|col| col.ensure(index));
    STYLES.with(|col| col.ensure(index));
}

/// Clear values at index.
pub fn clear_at_index(index: usize) {
    ATTRIBUTES.with(|col| col.clear(index));
    CLASSES.with(|col| col.clear(index));
    STYLES.with(|col| col.clear(index));
}

/// Reset all arrays.
pub fn reset() {
    ATTRIBUTES.with(|col| col.reset());
    CLASSES.with(|col| col.reset());
    STYLES.with(|col| col.reset());
}

// =============================================================================
// Attributes
// =============================================================================

/// All attributes in declaration order.
pub fn get_attributes(index: usize) -> Vec<(String, String)> {
    ATTRIBUTES.with(|col| col.read(index, Clone::clone))
}

pub fn get_attribute(index: usize, name: &str) -> Option<String> {
    ATTRIBUTES.with(|col| {
        col.read(index, |attrs| {
            attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
        })
    })
}

/// Set an attribute, replacing an existing one in place.
pub fn set_attribute(index: usize, name: &str, value: &str) {
    ATTRIBUTES.with(|col| {
        col.write(index, |attrs| match attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        })
    });
}

/// Remove an attribute. Returns whether it existed.
pub fn remove_attribute(index: usize, name: &str) -> bool {
    ATTRIBUTES.with(|col| {
        col.write(index, |attrs| {
            let before = attrs.len();
            attrs.retain(|(n, _)| n != name);
            attrs.len() != before
        })
    })
}

// =============================================================================
// Classes
// =============================================================================

pub fn get_classes(index: usize) -> Vec<String> {
    CLASSES.with(|col| col.read(index, Clone::clone))
}

pub fn has_class(index: usize, class: &str) -> bool {
    CLASSES.with(|col| col.read(index, |classes| classes.iter().any(|c| c == class)))
}

/// Add a class. Returns false if it was already present.
pub fn add_class(index: usize, class: &str) -> bool {
    CLASSES.with(|col| {
        col.write(index, |classes| {
            if classes.iter().any(|c| c == class) {
                false
            } else {
                classes.push(class.to_string());
                true
            }
        })
    })
}

/// Remove a class. Returns whether it was present.
pub fn remove_class(index: usize, class: &str) -> bool {
    CLASSES.with(|col| {
        col.write(index, |classes| {
            let before = classes.len();
            classes.retain(|c| c != class);
            classes.len() != before
        })
    })
}

// =============================================================================
// Styles
// =============================================================================

pub fn get_styles(index: usize) -> Vec<(String, String)> {
    STYLES.with(|col| col.read(index, Clone::clone))
}

pub fn get_style(index: usize, property: &str) -> Option<String> {
    STYLES.with(|col| {
        col.read(index, |styles| {
            styles.iter().find(|(p, _)| p == property).map(|(_, v)| v.clone())
        })
    })
}

/// Set an inline style property. Returns the previous value.
pub fn set_style(index: usize, property: &str, value: &str) -> Option<String> {
    STYLES.with(|col| {
        col.write(index, |styles| match styles.iter_mut().find(|(p, _)| p == property) {
            Some((_, v)) => Some(std::mem::replace(v, value.to_string())),
            None => {
                styles.push((property.to_string(), value.to_string()));
                None
            }
        })
    })
}

/// Remove an inline style property. Returns the previous value.
pub fn remove_style(index: usize, property: &str) -> Option<String> {
    STYLES.with(|col| {
        col.write(index, |styles| {
            let position = styles.iter().position(|(p, _)| p == property)?;
            Some(styles.remove(position).1)
        })
    })
}

/// Replace every inline style at once, returning the previous list.
pub fn replace_styles(index: usize, styles: Vec<(String, String)>) -> Vec<(String, String)> {
    STYLES.with(|col| col.write(index, |current| std::mem::replace(current, styles)))
}
