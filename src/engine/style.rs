//! Classes, inline styles and computed style.
//!
//! `set_classes` / `set_styles` apply a class or style value and hand back an undo
//! closure that reverts exactly what they changed. Transitions and the `class` /
//! `style` bindings rely on that to restore a node's declarative styling.
//!
//! Computed style is resolved from inline styles first, then from class rules
//! registered with [`define_class_rule`] (later rules win).

use std::cell::RefCell;

use super::arrays::attrs;
use crate::types::{is_truthy, NodeIndex, Value};

/// Reverts one `set_classes` / `set_styles` call.
pub type Undo = Box<dyn FnOnce()>;

thread_local! {
    static CLASS_RULES: RefCell<Vec<(String, Vec<(String, String)>)>> = const { RefCell::new(Vec::new()) };
}

// =============================================================================
// Classes
// =============================================================================

/// Apply a class value (`"a b"`, `["a", "b"]` or `{"a": true, "b": false}`).
///
/// The undo removes the classes this call added and restores the ones it removed.
pub fn set_classes(node: NodeIndex, value: &Value) -> Undo {
    let mut added: Vec<String> = Vec::new();
    let mut removed: Vec<String> = Vec::new();

    let mut add = |class: &str| {
        if attrs::add_class(node, class) {
            added.push(class.to_string());
        }
    };

    match value {
        Value::String(classes) => classes.split_whitespace().for_each(&mut add),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .flat_map(str::split_whitespace)
            .for_each(&mut add),
        Value::Object(map) => {
            for (classes, enabled) in map {
                for class in classes.split_whitespace() {
                    if is_truthy(enabled) {
                        add(class);
                    } else if attrs::remove_class(node, class) {
                        removed.push(class.to_string());
                    }
                }
            }
        }
        _ => {}
    }

    Box::new(move || {
        for class in &added {
            attrs::remove_class(node, class);
        }
        for class in &removed {
            attrs::add_class(node, class);
        }
    })
}

// =============================================================================
// Styles
// =============================================================================

/// `transitionDuration` → `transition-duration`.
pub fn kebab_case(property: &str) -> String {
    let mut out = String::with_capacity(property.len() + 4);
    for c in property.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse `"color: red; display: none"` into property/value pairs.
pub fn parse_style_string(text: &str) -> Vec<(String, String)> {
    text.split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let property = property.trim();
            (!property.is_empty()).then(|| (property.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Apply a style value (object of properties, or a full style string).
///
/// Object form sets each property and the undo restores previous values.
/// String form replaces the whole inline style and the undo restores it.
pub fn set_styles(node: NodeIndex, value: &Value) -> Undo {
    match value {
        Value::Object(map) => {
            let mut previous: Vec<(String, Option<String>)> = Vec::new();
            for (property, value) in map {
                let property = kebab_case(property);
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let old = attrs::set_style(node, &property, &text);
                previous.push((property, old));
            }
            Box::new(move || {
                for (property, old) in previous.into_iter().rev() {
                    match old {
                        Some(old) => {
                            attrs::set_style(node, &property, &old);
                        }
                        None => {
                            attrs::remove_style(node, &property);
                        }
                    }
                }
            })
        }
        Value::String(text) => {
            let cached = attrs::replace_styles(node, parse_style_string(text));
            Box::new(move || {
                attrs::replace_styles(node, cached);
            })
        }
        _ => Box::new(|| {}),
    }
}

// =============================================================================
// Computed Style
// =============================================================================

/// Register style declarations applied to every node carrying `class`.
pub fn define_class_rule(class: &str, declarations: &[(&str, &str)]) {
    let declarations = declarations
        .iter()
        .map(|(p, v)| (kebab_case(p), v.to_string()))
        .collect();
    CLASS_RULES.with(|rules| rules.borrow_mut().push((class.to_string(), declarations)));
}

/// Resolve a property from inline styles, then class rules.
pub fn computed_style(node: NodeIndex, property: &str) -> Option<String> {
    let property = kebab_case(property);
    if let Some(inline) = attrs::get_style(node, &property) {
        return Some(inline);
    }
    let classes = attrs::get_classes(node);
    CLASS_RULES.with(|rules| {
        rules
            .borrow()
            .iter()
            .filter(|(class, _)| classes.contains(class))
            .filter_map(|(_, declarations)| {
                declarations.iter().find(|(p, _)| *p == property).map(|(_, v)| v.clone())
            })
            .last()
    })
}

pub(crate) fn reset_class_rules() {
    CLASS_RULES.with(|rules| rules.borrow_mut().clear());
}
