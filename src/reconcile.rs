//! Keyed-List Reconciler - The `for` directive.
//!
//! Each evaluation of the source collection is diffed by key against the previous
//! pass, then applied to the tree in four batches:
//!
//! ```text
//! removes  → destroy + detach nodes whose key disappeared
//! moves    → swap existing nodes around a temporary marker, refresh their scope
//! adds     → clone the template, attach a reactive scope, initialize the clone
//! sames    → refresh the scope of nodes that stayed in place
//! ```
//!
//! Nodes are never recreated for a key that survives a pass, so anything stored
//! on them (text typed into an input, focus, nested state) survives reordering.
//!
//! Per-anchor state (`prev_keys` plus the key → node lookup) lives in a side
//! table keyed by the template node and is dropped when the directive is torn down.
//!
//! Duplicate keys are not rendered twice. The first item with a given key wins;
//! every later item with that key is skipped for the pass and reported as
//! [`Warning::DuplicateKey`]. `prev_keys` therefore never repeats a key and each
//! key maps to exactly one node, so the skipped items simply do not appear.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::conditional::current_if_node;
use crate::diagnostics::{warn, Warning};
use crate::directives::{detached, Directive, DirectiveContext, Getter};
use crate::engine::{
    clone_node, create_element, insert_after, insert_before, is_template, on_destroy, release_index,
    remove, template_root,
};
use crate::error::{DirectiveError, Result};
use crate::pipeline::mutate_dom;
use crate::runtime::Runtime;
use crate::scope::{add_scope_to_node, ReactiveScope};
use crate::types::{Key, NodeIndex, Scope, Value};

// =============================================================================
// for expressions
// =============================================================================

/// The names declared by a `for` expression.
///
/// ```text
/// (todo, i, all) in todos    item="todo" index="i" collection="all" items="todos"
/// [key, value] of pairs      item="[key, value]"                    items="pairs"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForIterator {
    pub item: String,
    pub index: Option<String>,
    pub collection: Option<String>,
    pub items: String,
}

/// Split `expression` at the first whitespace-delimited `in` / `of`.
fn split_alias(expression: &str) -> Option<(&str, &str)> {
    let bytes = expression.as_bytes();
    for (start, c) in expression.char_indices() {
        if !c.is_whitespace() {
            continue;
        }
        let word = start + expression[start..].find(|c: char| !c.is_whitespace())?;
        let is_keyword = expression[word..].starts_with("in") || expression[word..].starts_with("of");
        if is_keyword && bytes.get(word + 2).is_some_and(|b| b.is_ascii_whitespace()) {
            return Some((&expression[..start], &expression[word + 2..]));
        }
    }
    None
}

/// Parse `item [, index [, collection]] in items`.
pub fn parse_for_expression(expression: &str) -> Result<ForIterator> {
    let invalid = || DirectiveError::ForExpression(expression.to_string());
    let (left, right) = split_alias(expression).ok_or_else(invalid)?;
    let items = right.trim();
    let left = left.trim();
    let left = left.strip_prefix('(').unwrap_or(left);
    let left = left.strip_suffix(')').unwrap_or(left).trim();
    if left.is_empty() || items.is_empty() {
        return Err(invalid());
    }

    // The leftmost comma followed by at most one more comma and no closing
    // bracket starts the index/collection aliases.
    for (position, _) in left.match_indices(',') {
        let rest: Vec<&str> = left[position + 1..].split(',').collect();
        let plain = rest.len() <= 2 && rest.iter().all(|part| !part.contains(['}', ']']));
        if plain {
            return Ok(ForIterator {
                item: left[..position].trim().to_string(),
                index: Some(rest[0].trim().to_string()),
                collection: rest.get(1).map(|c| c.trim().to_string()),
                items: items.to_string(),
            });
        }
    }

    Ok(ForIterator { item: left.to_string(), index: None, collection: None, items: items.to_string() })
}

fn destructured_names(pattern: &str, open: char, close: char) -> Option<Vec<String>> {
    let inner = pattern.strip_prefix(open)?.strip_suffix(close)?;
    Some(inner.split(',').map(|name| name.trim().to_string()).filter(|n| !n.is_empty()).collect())
}

/// Scope variables of one iteration: the item (possibly destructured) plus the
/// index and collection aliases when declared.
pub fn iteration_scope_variables(iterator: &ForIterator, item: &Value, index: Value, items: &Value) -> Scope {
    let mut scope = Scope::new();

    match item {
        Value::Array(values) if destructured_names(&iterator.item, '[', ']').is_some() => {
            let names = destructured_names(&iterator.item, '[', ']').unwrap_or_default();
            for (position, name) in names.into_iter().enumerate() {
                scope.insert(name, values.get(position).cloned().unwrap_or(Value::Null));
            }
        }
        Value::Object(fields) if destructured_names(&iterator.item, '{', '}').is_some() => {
            let names = destructured_names(&iterator.item, '{', '}').unwrap_or_default();
            for name in names {
                let value = fields.get(&name).cloned().unwrap_or(Value::Null);
                scope.insert(name, value);
            }
        }
        _ => {
            scope.insert(iterator.item.clone(), item.clone());
        }
    }

    if let Some(index_name) = &iterator.index {
        scope.insert(index_name.clone(), index);
    }
    if let Some(collection) = &iterator.collection {
        scope.insert(collection.clone(), items.clone());
    }
    scope
}

/// Turn the evaluated source into `(index, item)` pairs.
///
/// - `n >= 0` → `1..=n` (fractions are truncated), negative numbers → nothing
/// - `null` and booleans → nothing
/// - objects → their entries, indexed by key
/// - strings → their characters
pub fn normalize_items(source: &Value) -> Vec<(Value, Value)> {
    match source {
        Value::Number(n) => {
            let count = n.as_f64().filter(|n| n.is_finite() && *n >= 0.0).map_or(0, |n| n.trunc() as u64);
            (1..=count).enumerate().map(|(i, n)| (Value::from(i), Value::from(n))).collect()
        }
        Value::Array(items) => items.iter().enumerate().map(|(i, item)| (Value::from(i), item.clone())).collect(),
        Value::Object(fields) => {
            fields.iter().map(|(key, item)| (Value::String(key.clone()), item.clone())).collect()
        }
        Value::String(text) => {
            text.chars().enumerate().map(|(i, c)| (Value::from(i), Value::String(c.to_string()))).collect()
        }
        Value::Null | Value::Bool(_) => Vec::new(),
    }
}

// =============================================================================
// Key diffing
// =============================================================================

/// Where an added node goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Right after the template.
    Head,
    /// Right after the node of this key.
    After(Key),
}

/// Everything one pass changes, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDiff {
    pub removes: Vec<Key>,
    /// `(key in spot, key for spot)`: the two nodes swap places.
    pub moves: Vec<(Key, Key)>,
    /// `(anchor, position in the new key list)`.
    pub adds: Vec<(Anchor, usize)>,
    pub sames: Vec<Key>,
}

impl KeyDiff {
    pub fn is_noop(&self) -> bool {
        self.removes.is_empty() && self.moves.is_empty() && self.adds.is_empty()
    }
}

/// Diff unique `keys` against the previous pass.
///
/// Moves are computed on a working copy of `prev_keys`: putting the right key at
/// position `i` swaps it with whatever is there. Everything before `i` already
/// matches `keys`, so the key being moved always comes from further right.
pub fn diff_keys(prev_keys: &[Key], keys: &[Key]) -> KeyDiff {
    let current: HashSet<&Key> = keys.iter().collect();
    let mut diff = KeyDiff {
        removes: prev_keys.iter().filter(|key| !current.contains(key)).cloned().collect(),
        ..KeyDiff::default()
    };

    let mut working: Vec<Key> = prev_keys.iter().filter(|key| current.contains(key)).cloned().collect();
    let mut last = Anchor::Head;

    for (i, key) in keys.iter().enumerate() {
        match working.iter().position(|k| k == key) {
            None => {
                working.insert(i, key.clone());
                diff.adds.push((last, i));
            }
            Some(p) if p != i => {
                let key_in_spot = working[i].clone();
                working.swap(i, p);
                diff.moves.push((key_in_spot, key.clone()));
            }
            Some(_) => diff.sames.push(key.clone()),
        }
        last = Anchor::After(key.clone());
    }
    diff
}

// =============================================================================
// Per-anchor state
// =============================================================================

struct Entry {
    node: NodeIndex,
    scope: Rc<ReactiveScope>,
}

#[derive(Default)]
struct ListState {
    prev_keys: Vec<Key>,
    lookup: HashMap<Key, Entry>,
    last_diff: KeyDiff,
}

thread_local! {
    static LISTS: RefCell<HashMap<NodeIndex, ListState>> = RefCell::new(HashMap::new());
    static KEY_EXPRESSIONS: RefCell<HashMap<NodeIndex, String>> = RefCell::new(HashMap::new());
}

/// Remember the `:key` expression of a list template.
pub fn store_key_expression(node: NodeIndex, expression: &str) {
    let existed = KEY_EXPRESSIONS.with(|k| k.borrow_mut().insert(node, expression.to_string()).is_some());
    if !existed {
        on_destroy(node, move || {
            KEY_EXPRESSIONS.with(|k| k.borrow_mut().remove(&node));
        });
    }
}

pub fn key_expression(node: NodeIndex) -> Option<String> {
    KEY_EXPRESSIONS.with(|k| k.borrow().get(&node).cloned())
}

/// Keys currently rendered after `anchor`, in order.
pub fn rendered_keys(anchor: NodeIndex) -> Vec<Key> {
    LISTS.with(|lists| lists.borrow().get(&anchor).map(|s| s.prev_keys.clone()).unwrap_or_default())
}

/// The node rendered for `key`.
pub fn rendered_node(anchor: NodeIndex, key: &Key) -> Option<NodeIndex> {
    LISTS.with(|lists| lists.borrow().get(&anchor)?.lookup.get(key).map(|entry| entry.node))
}

/// Rendered nodes in key order.
pub fn rendered_nodes(anchor: NodeIndex) -> Vec<NodeIndex> {
    LISTS.with(|lists| {
        let lists = lists.borrow();
        let Some(state) = lists.get(&anchor) else {
            return Vec::new();
        };
        state.prev_keys.iter().filter_map(|key| state.lookup.get(key).map(|e| e.node)).collect()
    })
}

/// The diff applied by the latest pass.
pub fn last_diff(anchor: NodeIndex) -> Option<KeyDiff> {
    LISTS.with(|lists| lists.borrow().get(&anchor).map(|s| s.last_diff.clone()))
}

pub(crate) fn reset_lists() {
    LISTS.with(|lists| lists.borrow_mut().clear());
    KEY_EXPRESSIONS.with(|k| k.borrow_mut().clear());
}

// =============================================================================
// for directive
// =============================================================================

/// `x-for="item in items"` on a template, keyed by `:key` (default `index`).
pub fn for_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    if !is_template(node) {
        warn(Warning::MisplacedDirective { directive: directive.original.clone(), expected: "template", node });
        return Ok(());
    }
    let iterator = match parse_for_expression(&directive.expression) {
        Ok(iterator) => iterator,
        Err(_) => {
            warn(Warning::InvalidForExpression { node, expression: directive.expression.clone() });
            return Ok(());
        }
    };

    let runtime = cx.runtime().clone();
    let key_source = key_expression(node).unwrap_or_else(|| runtime.config().default_key_expression.clone());
    let items = cx.evaluate_later(&iterator.items);
    let key = cx.evaluate_later(&key_source);

    LISTS.with(|lists| lists.borrow_mut().insert(node, ListState::default()));

    let loop_runtime = runtime.clone();
    cx.effect(move || reconcile(&loop_runtime, node, &iterator, &items, &key));
    cx.cleanup(move || teardown(&runtime, node));
    Ok(())
}

fn destroy_entry(runtime: &Runtime, entry: &Entry) {
    mutate_dom(|| {
        runtime.destroy_tree(entry.node);
        remove(entry.node);
        release_index(entry.node);
    });
}

fn teardown(runtime: &Runtime, anchor: NodeIndex) {
    let state = LISTS.with(|lists| lists.borrow_mut().remove(&anchor));
    let Some(mut state) = state else {
        return;
    };
    for key in &state.prev_keys {
        if let Some(entry) = state.lookup.remove(key) {
            destroy_entry(runtime, &entry);
        }
    }
    tracing::debug!(target: "spark_directives", anchor, "list torn down");
}

/// One reconciliation pass.
fn reconcile(runtime: &Runtime, anchor: NodeIndex, iterator: &ForIterator, items: &Getter, key: &Getter) {
    let source = items(None);

    let mut keys: Vec<Key> = Vec::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut composite: Vec<bool> = Vec::new();
    let mut seen: HashSet<Key> = HashSet::new();

    for (index, item) in normalize_items(&source) {
        let scope = iteration_scope_variables(iterator, &item, index.clone(), &source);
        let mut overlay = Scope::new();
        overlay.insert("index".to_string(), index);
        overlay.extend(scope.clone());

        let key_value = key(Some(overlay));
        let item_key = Key::from_value(&key_value);
        if !seen.insert(item_key.clone()) {
            // First occurrence wins, see the module docs.
            warn(Warning::DuplicateKey { anchor, key: item_key.to_string() });
            continue;
        }
        keys.push(item_key);
        scopes.push(scope);
        composite.push(Key::is_composite(&key_value));
    }

    // Out of the table while the tree is touched: initializing clones may reach
    // other lists.
    let Some(mut state) = LISTS.with(|lists| lists.borrow_mut().remove(&anchor)) else {
        return;
    };
    let diff = diff_keys(&state.prev_keys, &keys);
    let position: HashMap<&Key, usize> = keys.iter().enumerate().map(|(i, k)| (k, i)).collect();

    for removed in &diff.removes {
        if let Some(entry) = state.lookup.remove(removed) {
            destroy_entry(runtime, &entry);
        }
    }

    for (key_in_spot, key_for_spot) in &diff.moves {
        let (Some(in_spot), Some(for_spot)) = (state.lookup.get(key_in_spot), state.lookup.get(key_for_spot)) else {
            warn(Warning::InvalidMoveKey { anchor, key: key_for_spot.to_string() });
            continue;
        };
        let (el_in, el_for) = (in_spot.node, for_spot.node);

        mutate_dom(|| {
            let marker = create_element("div");
            insert_after(el_for, marker);
            insert_after(el_in, el_for);
            if let Some(if_node) = current_if_node(el_for) {
                insert_after(el_for, if_node);
            }
            insert_before(marker, el_in);
            if let Some(if_node) = current_if_node(el_in) {
                insert_after(el_in, if_node);
            }
            remove(marker);
            release_index(marker);
        });

        if let Some(&i) = position.get(key_for_spot) {
            for_spot.scope.refresh(&scopes[i]);
        }
    }

    let template = template_root(anchor);
    for (after, i) in &diff.adds {
        let Some(template) = template else {
            tracing::debug!(target: "spark_directives", anchor, "list template has no content");
            break;
        };
        let mut last = match after {
            Anchor::Head => anchor,
            Anchor::After(previous) => state.lookup.get(previous).map_or(anchor, |entry| entry.node),
        };
        if let Some(if_node) = current_if_node(last) {
            last = if_node;
        }

        let clone = clone_node(template);
        let scope = ReactiveScope::new(scopes[*i].clone());
        add_scope_to_node(clone, scope.clone(), Some(anchor));

        mutate_dom(|| {
            insert_after(last, clone);
            detached(|| runtime.init_tree(clone));
        });

        if composite[*i] {
            warn(Warning::CompositeKey { anchor, key: keys[*i].to_string() });
        }
        state.lookup.insert(keys[*i].clone(), Entry { node: clone, scope });
    }

    for same in &diff.sames {
        if let (Some(entry), Some(&i)) = (state.lookup.get(same), position.get(same)) {
            entry.scope.refresh(&scopes[i]);
        }
    }

    tracing::debug!(
        target: "spark_directives",
        anchor,
        keys = keys.len(),
        removes = diff.removes.len(),
        moves = diff.moves.len(),
        adds = diff.adds.len(),
        sames = diff.sames.len(),
        "list reconciled"
    );

    state.prev_keys = keys;
    state.last_diff = diff;
    LISTS.with(|lists| lists.borrow_mut().insert(anchor, state));
}
