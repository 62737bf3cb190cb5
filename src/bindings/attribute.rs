//! Attribute binder - Writes one bound value onto a node.
//!
//! - `class` / `style`: applied through the style helpers; the previous binding's
//!   additions are undone before the new value is applied
//! - boolean attributes (`disabled`, `checked`, ...): present as `name="name"` or absent
//! - `null` / `false` remove the attribute, except the `aria-*` states that must
//!   keep an explicit `"false"`
//! - everything else: set only when the text changes
//!
//! The last value bound under each name is recorded and readable through
//! [`get_binding`].

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::engine::{
    get_attribute, on_destroy, remove_attribute, set_attribute, set_classes, set_styles, Undo,
};
use crate::types::{value_to_attribute_string, NodeIndex, Value};

const BOOLEAN_ATTRIBUTES: [&str; 27] = [
    "allowfullscreen",
    "async",
    "autofocus",
    "autoplay",
    "checked",
    "controls",
    "default",
    "defer",
    "disabled",
    "formnovalidate",
    "inert",
    "ismap",
    "itemscope",
    "loop",
    "multiple",
    "muted",
    "nomodule",
    "novalidate",
    "open",
    "playsinline",
    "readonly",
    "required",
    "reversed",
    "selected",
    "shadowrootclonable",
    "shadowrootdelegatesfocus",
    "shadowrootserializable",
];

/// Attributes that keep `"false"` instead of being removed.
const PRESERVED_IF_FALSY: [&str; 4] = ["aria-pressed", "aria-checked", "aria-expanded", "aria-selected"];

#[derive(Default)]
struct BoundState {
    values: HashMap<String, Value>,
    undo_classes: Option<Undo>,
    undo_styles: Option<Undo>,
}

thread_local! {
    static BOUND: RefCell<HashMap<NodeIndex, BoundState>> = RefCell::new(HashMap::new());
    static TRACKED: RefCell<HashSet<NodeIndex>> = RefCell::new(HashSet::new());
}

pub fn is_boolean_attribute(name: &str) -> bool {
    BOOLEAN_ATTRIBUTES.contains(&name)
}

/// `data-item-id` → `dataItemId`.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.to_lowercase().chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn track(node: NodeIndex) {
    let fresh = TRACKED.with(|tracked| tracked.borrow_mut().insert(node));
    if fresh {
        on_destroy(node, move || {
            TRACKED.with(|tracked| tracked.borrow_mut().remove(&node));
            BOUND.with(|bound| bound.borrow_mut().remove(&node));
        });
    }
}

/// Bind `value` to attribute `name` of `node`.
pub fn bind_attribute(node: NodeIndex, name: &str, value: &Value, modifiers: &[String]) {
    track(node);
    BOUND.with(|bound| {
        bound
            .borrow_mut()
            .entry(node)
            .or_default()
            .values
            .insert(name.to_string(), value.clone());
    });

    let name = if modifiers.iter().any(|m| m == "camel") {
        camel_case(name)
    } else {
        name.to_string()
    };

    match name.as_str() {
        "class" => {
            undo_classes(node);
            let undo = set_classes(node, value);
            BOUND.with(|bound| bound.borrow_mut().entry(node).or_default().undo_classes = Some(undo));
        }
        "style" => {
            undo_styles(node);
            let undo = set_styles(node, value);
            BOUND.with(|bound| bound.borrow_mut().entry(node).or_default().undo_styles = Some(undo));
        }
        _ => write_attribute(node, &name, value),
    }
}

fn write_attribute(node: NodeIndex, name: &str, value: &Value) {
    let falsy = matches!(value, Value::Null | Value::Bool(false));
    if falsy && !PRESERVED_IF_FALSY.contains(&name) {
        remove_attribute(node, name);
        return;
    }
    let text = if is_boolean_attribute(name) {
        name.to_string()
    } else {
        value_to_attribute_string(value)
    };
    if get_attribute(node, name).as_deref() != Some(text.as_str()) {
        set_attribute(node, name, &text);
    }
}

fn undo_classes(node: NodeIndex) {
    let undo = BOUND.with(|bound| bound.borrow_mut().get_mut(&node).and_then(|s| s.undo_classes.take()));
    if let Some(undo) = undo {
        undo();
    }
}

fn undo_styles(node: NodeIndex) {
    let undo = BOUND.with(|bound| bound.borrow_mut().get_mut(&node).and_then(|s| s.undo_styles.take()));
    if let Some(undo) = undo {
        undo();
    }
}

/// Revert the classes and styles added by `class` / `style` bindings.
pub(crate) fn undo_bound_styling(node: NodeIndex) {
    undo_classes(node);
    undo_styles(node);
}

/// Read a binding: the last bound value, else the attribute itself.
///
/// An empty attribute reads as `true`; boolean attributes read as booleans.
pub fn get_binding(node: NodeIndex, name: &str, fallback: Value) -> Value {
    let bound = BOUND.with(|bound| {
        bound.borrow().get(&node).and_then(|s| s.values.get(name).cloned())
    });
    if let Some(value) = bound {
        return value;
    }
    match get_attribute(node, name) {
        None => fallback,
        Some(text) if text.is_empty() => Value::Bool(true),
        Some(text) if is_boolean_attribute(name) => Value::Bool(text == name || text == "true"),
        Some(text) => Value::String(text),
    }
}

pub(crate) fn reset_attribute_bindings() {
    BOUND.with(|bound| bound.borrow_mut().clear());
    TRACKED.with(|tracked| tracked.borrow_mut().clear());
}
