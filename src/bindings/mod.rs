//! Binding Applicator - Apply a set of directives and attributes to one node.
//!
//! A binding set is a flat, ordered list of `(name, value)` pairs:
//!
//! ```ignore
//! let dropdown = BindingSource::from_pairs([
//!     ("x-data", json!("{\"open\": false}")),
//!     ("@click", json!("open = !open")),
//!     (":aria-expanded", json!("open")),
//!     ("role", json!("button")),
//! ]);
//! let cleanup = apply_bindings(&runtime, node, &dropdown);
//! ```
//!
//! Directive names (`x-*`, `:name`, `@name`) keep their value as the expression.
//! Plain names are rewritten to `x-bind:name` bound to the literal value.
//!
//! Re-applying to the same node first runs the previous application's cleanups
//! (last registered first), so attributes are never duplicated and listeners
//! never leak. The returned aggregate cleanup runs at most once and only while
//! its application is still the current one.

pub mod attribute;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::diagnostics::{warn, Warning};
use crate::directives::{attributes_only, detached, directives_from, run_cleanups, Directive, DirectiveContext};
use crate::engine::on_destroy;
use crate::error::Result;
use crate::pipeline::mutate_dom;
use crate::runtime::Runtime;
use crate::types::{Cleanup, NodeIndex, Value};

pub use attribute::{bind_attribute, camel_case, get_binding, is_boolean_attribute};

// =============================================================================
// Binding Sources
// =============================================================================

/// A binding set, or a function producing one on every application.
#[derive(Clone)]
pub enum BindingSource {
    Static(Vec<(String, Value)>),
    Dynamic(Rc<dyn Fn() -> Vec<(String, Value)>>),
}

impl BindingSource {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Self::Static(pairs.into_iter().map(|(n, v)| (n.to_string(), v)).collect())
    }

    pub fn dynamic(f: impl Fn() -> Vec<(String, Value)> + 'static) -> Self {
        Self::Dynamic(Rc::new(f))
    }

    /// An object value as a binding set. Anything else yields an empty set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Static(map.into_iter().collect()),
            _ => Self::Static(Vec::new()),
        }
    }

    /// The current entries.
    pub fn entries(&self) -> Vec<(String, Value)> {
        match self {
            Self::Static(entries) => entries.clone(),
            Self::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(entries) => f.debug_tuple("Static").field(entries).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

// =============================================================================
// Applied Cleanups (side table)
// =============================================================================

struct Applied {
    generation: u64,
    cleanups: Vec<Cleanup>,
}

thread_local! {
    static APPLIED: RefCell<HashMap<NodeIndex, Applied>> = RefCell::new(HashMap::new());
    static TRACKED: RefCell<HashSet<NodeIndex>> = RefCell::new(HashSet::new());
    static GENERATION: Cell<u64> = const { Cell::new(0) };
}

fn track(node: NodeIndex) {
    let fresh = TRACKED.with(|tracked| tracked.borrow_mut().insert(node));
    if fresh {
        on_destroy(node, move || {
            TRACKED.with(|tracked| tracked.borrow_mut().remove(&node));
            run_binding_cleanups(node);
        });
    }
}

/// Run (and forget) the cleanups of the node's current binding application.
pub fn run_binding_cleanups(node: NodeIndex) {
    let applied = APPLIED.with(|applied| applied.borrow_mut().remove(&node));
    if let Some(applied) = applied {
        run_cleanups(applied.cleanups);
    }
}

fn run_if_current(node: NodeIndex, generation: u64) {
    let current = APPLIED.with(|applied| {
        applied.borrow().get(&node).is_some_and(|a| a.generation == generation)
    });
    if current {
        run_binding_cleanups(node);
    }
}

/// Number of cleanups held for the node's current binding application.
pub fn binding_cleanup_count(node: NodeIndex) -> usize {
    APPLIED.with(|applied| applied.borrow().get(&node).map_or(0, |a| a.cleanups.len()))
}

pub(crate) fn reset_bindings() {
    APPLIED.with(|applied| applied.borrow_mut().clear());
    TRACKED.with(|tracked| tracked.borrow_mut().clear());
    GENERATION.with(|g| g.set(0));
    attribute::reset_attribute_bindings();
}

// =============================================================================
// Applying
// =============================================================================

fn expression_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Apply a binding set to `node`, replacing any previous application.
pub fn apply_bindings(runtime: &Runtime, node: NodeIndex, source: &BindingSource) -> Cleanup {
    run_binding_cleanups(node);

    let prefix = runtime.config().prefix.clone();
    let entries = source.entries();
    let attributes: Vec<(String, String)> =
        entries.iter().map(|(name, value)| (name.clone(), expression_text(value))).collect();
    let plain: HashSet<String> =
        attributes_only(&attributes, &prefix).into_iter().map(|(name, _)| name).collect();

    let rewritten: Vec<(String, String)> = entries
        .iter()
        .zip(attributes)
        .map(|((_, value), (name, expression))| {
            if plain.contains(&name) {
                // A literal: strings are quoted, other values keep their JSON form.
                (format!("{prefix}bind:{name}"), value.to_string())
            } else {
                (name, expression)
            }
        })
        .collect();

    let directives = directives_from(&rewritten, &prefix);
    let mut cleanups = Vec::new();
    for directive in &directives {
        cleanups.extend(runtime.run_directive(node, directive));
    }

    tracing::debug!(
        target: "spark_directives",
        node,
        directives = directives.len(),
        cleanups = cleanups.len(),
        "applied bindings"
    );

    let generation = GENERATION.with(|g| {
        let next = g.get() + 1;
        g.set(next);
        next
    });
    track(node);
    APPLIED.with(|applied| applied.borrow_mut().insert(node, Applied { generation, cleanups }));

    Box::new(move || run_if_current(node, generation))
}

// =============================================================================
// bind directive
// =============================================================================

/// `x-bind:name="expr"`, `:key` on list templates, and `x-bind="object | provider"`.
pub fn bind_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    if directive.value.is_empty() {
        return bind_object(node, directive, cx);
    }

    if directive.value == "key" {
        crate::reconcile::store_key_expression(node, &directive.expression);
        return Ok(());
    }

    let getter = cx.evaluate_later(&directive.expression);
    let name = directive.value.clone();
    let modifiers = directive.modifiers.clone();
    cx.effect(move || {
        let value = getter(None);
        mutate_dom(|| bind_attribute(node, &name, &value, &modifiers));
    });
    cx.cleanup(move || attribute::undo_bound_styling(node));
    Ok(())
}

fn bind_object(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let runtime = cx.runtime().clone();
    let provider = runtime.binding_provider(directive.expression.trim());
    let getter = cx.evaluate_later(&directive.expression);
    let expression = directive.expression.trim().to_string();

    cx.effect(move || {
        let source = match &provider {
            Some(source) => source.clone(),
            None => {
                let value = getter(None);
                if !value.is_object() {
                    warn(Warning::UnknownBinding { node, name: expression.clone() });
                }
                BindingSource::from_value(value)
            }
        };
        // The previous application is cleaned up by the next one (or by teardown).
        let _ = detached(|| apply_bindings(&runtime, node, &source));
    });
    cx.cleanup(move || run_binding_cleanups(node));
    Ok(())
}
