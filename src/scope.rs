//! Scopes - Reactive projections and per-node scope stacks.
//!
//! A [`ReactiveScope`] holds one `Signal<Value>` per field, so effects that read a
//! field re-run when that field (and only that field) changes. Refreshing a scope
//! writes field by field into the existing signals; the projection itself is never
//! replaced.
//!
//! Each node may carry a scope stack (innermost first) in a side table. Expression
//! evaluation walks up from the node to the closest stack and layers an optional
//! overlay (`index`, `$event`, ...) on top:
//!
//! ```text
//! overlay → clone scope (item, index) → data scope → ...
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use spark_signals::{signal, Signal};

use crate::engine::{on_destroy, parent};
use crate::types::{NodeIndex, Scope, Value};

// =============================================================================
// Reactive Projection
// =============================================================================

/// A scope whose field writes notify the effects that read them.
pub struct ReactiveScope {
    fields: RefCell<HashMap<String, Signal<Value>>>,
}

impl ReactiveScope {
    /// Wrap a plain scope in a reactive projection.
    pub fn new(scope: Scope) -> Rc<Self> {
        let fields = scope.into_iter().map(|(name, value)| (name, signal(value))).collect();
        Rc::new(Self { fields: RefCell::new(fields) })
    }

    pub fn empty() -> Rc<Self> {
        Self::new(Scope::new())
    }

    fn field(&self, name: &str) -> Option<Signal<Value>> {
        self.fields.borrow().get(name).cloned()
    }

    /// Read a field (tracked by the running effect).
    pub fn get(&self, name: &str) -> Option<Value> {
        self.field(name).map(|field| field.get())
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.borrow().contains_key(name)
    }

    /// Write a field, creating it if needed.
    pub fn set(&self, name: &str, value: Value) {
        match self.field(name) {
            Some(field) => {
                field.set(value);
            }
            None => {
                self.fields.borrow_mut().insert(name.to_string(), signal(value));
            }
        }
    }

    /// Push every field of `scope` into the existing projection.
    pub fn refresh(&self, scope: &Scope) {
        for (name, value) in scope {
            self.set(name, value.clone());
        }
    }

    /// Plain copy of the current field values.
    pub fn snapshot(&self) -> Scope {
        let fields: Vec<(String, Signal<Value>)> = self
            .fields
            .borrow()
            .iter()
            .map(|(name, field)| (name.clone(), field.clone()))
            .collect();
        fields.into_iter().map(|(name, field)| (name, field.get())).collect()
    }
}

impl std::fmt::Debug for ReactiveScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.fields.borrow().keys().cloned().collect();
        f.debug_struct("ReactiveScope").field("fields", &names).finish()
    }
}

// =============================================================================
// Node Scope Stacks
// =============================================================================

thread_local! {
    static SCOPE_STACKS: RefCell<HashMap<NodeIndex, Vec<Rc<ReactiveScope>>>> = RefCell::new(HashMap::new());
}

/// Attach `scope` to `node`, layered over the closest stack of `reference`
/// (or of the node's own ancestors when `reference` is `None`).
pub fn add_scope_to_node(node: NodeIndex, scope: Rc<ReactiveScope>, reference: Option<NodeIndex>) {
    let base = match reference {
        Some(reference) => closest_scope_stack(reference),
        None => parent(node).map(closest_scope_stack).unwrap_or_default(),
    };
    let mut stack = Vec::with_capacity(base.len() + 1);
    stack.push(scope);
    stack.extend(base);

    let existed = SCOPE_STACKS.with(|stacks| stacks.borrow_mut().insert(node, stack).is_some());
    if !existed {
        on_destroy(node, move || remove_scope(node));
    }
}

/// Drop the scope stack attached directly to `node`.
pub fn remove_scope(node: NodeIndex) {
    SCOPE_STACKS.with(|stacks| {
        stacks.borrow_mut().remove(&node);
    });
}

/// Whether `node` carries its own scope stack.
pub fn has_own_scope(node: NodeIndex) -> bool {
    SCOPE_STACKS.with(|stacks| stacks.borrow().contains_key(&node))
}

/// The stack attached to `node` or its nearest ancestor.
pub fn closest_scope_stack(node: NodeIndex) -> Vec<Rc<ReactiveScope>> {
    let mut current = Some(node);
    while let Some(index) = current {
        let found = SCOPE_STACKS.with(|stacks| stacks.borrow().get(&index).cloned());
        if let Some(stack) = found {
            return stack;
        }
        current = parent(index);
    }
    Vec::new()
}

/// Everything visible to expressions evaluated on `node`.
pub fn scope_chain(node: NodeIndex, overlay: Option<Scope>) -> ScopeChain {
    ScopeChain { layers: closest_scope_stack(node), overlay: overlay.unwrap_or_default(), node: Some(node) }
}

pub(crate) fn reset_scopes() {
    SCOPE_STACKS.with(|stacks| stacks.borrow_mut().clear());
}

// =============================================================================
// Scope Chain
// =============================================================================

/// Layered, read-mostly view used by the evaluator.
#[derive(Debug, Default)]
pub struct ScopeChain {
    layers: Vec<Rc<ReactiveScope>>,
    overlay: Scope,
    node: Option<NodeIndex>,
}

impl ScopeChain {
    /// A chain not attached to any node.
    pub fn new(layers: Vec<Rc<ReactiveScope>>, overlay: Scope) -> Self {
        Self { layers, overlay, node: None }
    }

    /// The node the chain was built for, if any (`$id` resolves against it).
    pub fn node(&self) -> Option<NodeIndex> {
        self.node
    }

    /// Resolve a name: overlay first, then innermost layer outwards.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.overlay.get(name) {
            return Some(value.clone());
        }
        self.layers.iter().find_map(|layer| layer.get(name))
    }

    /// Write to the innermost layer defining `name`. Returns false if none does.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        match self.layers.iter().find(|layer| layer.has(name)) {
            Some(layer) => {
                layer.set(name, value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{append_child, create_element, release_index, reset_document};
    use serde_json::json;
    use spark_signals::effect;
    use std::cell::Cell;

    fn scope(value: Value) -> Scope {
        match value {
            Value::Object(map) => map,
            _ => Scope::new(),
        }
    }

    #[test]
    fn test_refresh_notifies_readers() {
        let projection = ReactiveScope::new(scope(json!({"v": "a"})));
        let seen = Rc::new(RefCell::new(Value::Null));
        let runs = Rc::new(Cell::new(0));

        let reader = projection.clone();
        let seen_clone = seen.clone();
        let runs_clone = runs.clone();
        let _stop = effect(move || {
            runs_clone.set(runs_clone.get() + 1);
            *seen_clone.borrow_mut() = reader.get("v").unwrap_or(Value::Null);
        });
        assert_eq!(*seen.borrow(), json!("a"));

        projection.refresh(&scope(json!({"v": "a2"})));
        assert_eq!(*seen.borrow(), json!("a2"));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_closest_stack_walks_up() {
        reset_document();
        reset_scopes();
        let outer = create_element("div");
        let inner = create_element("span");
        append_child(outer, inner);

        add_scope_to_node(outer, ReactiveScope::new(scope(json!({"a": 1, "b": 1}))), None);
        let clone_scope = ReactiveScope::new(scope(json!({"b": 2})));
        add_scope_to_node(inner, clone_scope, None);

        let chain = scope_chain(inner, Some(scope(json!({"c": 3}))));
        assert_eq!(chain.lookup("a"), Some(json!(1)));
        assert_eq!(chain.lookup("b"), Some(json!(2)), "innermost layer wins");
        assert_eq!(chain.lookup("c"), Some(json!(3)));
        assert_eq!(chain.lookup("missing"), None);
    }

    #[test]
    fn test_assign_targets_defining_layer() {
        reset_document();
        reset_scopes();
        let node = create_element("div");
        let root_scope = ReactiveScope::new(scope(json!({"open": false})));
        add_scope_to_node(node, root_scope.clone(), None);

        let chain = scope_chain(node, None);
        assert!(chain.assign("open", json!(true)));
        assert_eq!(root_scope.get("open"), Some(json!(true)));
        assert!(!chain.assign("nope", json!(1)));
    }

    #[test]
    fn test_scope_released_with_node() {
        reset_document();
        reset_scopes();
        let node = create_element("div");
        add_scope_to_node(node, ReactiveScope::empty(), None);
        assert!(has_own_scope(node));

        release_index(node);
        assert!(!has_own_scope(node));
    }
}
