//! `id` directive - Scoped ids for `$id(name[, key])`.
//!
//! `x-id='["tab"]'` makes the node an id root for `tab`. Every `$id('tab')`
//! evaluated on the root or below it resolves to the same `tab-<n>`, where `n` is
//! drawn once per root from a counter per name. A node outside any root draws
//! its own number.
//!
//! ```text
//! div[x-id='["tab"]']                       root: tab → 1
//!   button :id="$id('tab')"                 "tab-1"
//!   section :aria-labelledby="$id('tab')"   "tab-1"
//!   li :id="$id('tab', item.id)"            "tab-1-7"
//! span :id="$id('tab')"                     "tab-2"
//! ```
//!
//! Resolved ids are cached per node, so re-evaluating an expression never draws
//! a new number.

use std::cell::RefCell;
use std::collections::HashMap;

use super::{Directive, DirectiveContext};
use crate::engine::{on_destroy, parent};
use crate::error::{DirectiveError, Result};
use crate::types::{value_to_attribute_string, NodeIndex, Value};

thread_local! {
    static COUNTERS: RefCell<HashMap<String, u64>> = RefCell::new(HashMap::new());
    static ROOTS: RefCell<HashMap<NodeIndex, HashMap<String, u64>>> = RefCell::new(HashMap::new());
    static RESOLVED: RefCell<HashMap<NodeIndex, HashMap<String, String>>> = RefCell::new(HashMap::new());
}

fn next_id(name: &str) -> u64 {
    COUNTERS.with(|counters| {
        let mut counters = counters.borrow_mut();
        let counter = counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    })
}

/// Make `node` the id root for `name`. A node keeps its first number.
pub fn set_id_root(node: NodeIndex, name: &str) {
    let registered = ROOTS.with(|roots| roots.borrow().get(&node).is_some_and(|ids| ids.contains_key(name)));
    if registered {
        return;
    }
    let id = next_id(name);
    ROOTS.with(|roots| roots.borrow_mut().entry(node).or_default().insert(name.to_string(), id));
}

/// The number of the closest root for `name`, starting at `node` itself.
pub fn id_root(node: NodeIndex, name: &str) -> Option<u64> {
    let mut current = Some(node);
    while let Some(index) = current {
        let id = ROOTS.with(|roots| roots.borrow().get(&index).and_then(|ids| ids.get(name).copied()));
        if id.is_some() {
            return id;
        }
        current = parent(index);
    }
    None
}

/// `$id(name, key)` as seen from `node`.
pub fn element_id(node: NodeIndex, name: &str, key: Option<&str>) -> String {
    let key = key.filter(|key| !key.is_empty());
    let cache_key = match key {
        Some(key) => format!("{name}-{key}"),
        None => name.to_string(),
    };
    let cached = RESOLVED.with(|resolved| resolved.borrow().get(&node).and_then(|ids| ids.get(&cache_key).cloned()));
    if let Some(id) = cached {
        return id;
    }

    let number = id_root(node, name).unwrap_or_else(|| next_id(name));
    let id = match key {
        Some(key) => format!("{name}-{number}-{key}"),
        None => format!("{name}-{number}"),
    };

    let first = RESOLVED.with(|resolved| {
        let mut resolved = resolved.borrow_mut();
        let first = !resolved.contains_key(&node);
        resolved.entry(node).or_default().insert(cache_key, id.clone());
        first
    });
    if first {
        on_destroy(node, move || {
            RESOLVED.with(|resolved| resolved.borrow_mut().remove(&node));
        });
    }
    id
}

pub(crate) fn reset_ids() {
    COUNTERS.with(|counters| counters.borrow_mut().clear());
    ROOTS.with(|roots| roots.borrow_mut().clear());
    RESOLVED.with(|resolved| resolved.borrow_mut().clear());
}

/// `x-id='["name", ...]'` (a single string is accepted too).
pub fn id_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let names: Vec<String> = match cx.evaluate(&directive.expression)? {
        Value::Array(names) => names.iter().map(value_to_attribute_string).collect(),
        Value::String(name) => vec![name],
        _ => return Err(DirectiveError::parse(&directive.expression, "id must evaluate to a list of names")),
    };
    for name in &names {
        set_id_root(node, name);
    }
    cx.cleanup(move || {
        ROOTS.with(|roots| roots.borrow_mut().remove(&node));
    });
    Ok(())
}
