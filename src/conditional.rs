//! Conditional Renderer - The `if` directive.
//!
//! A template gates one clone of its content, inserted right after it. The clone
//! gets an empty scope layered over the template's, is initialized on mount and
//! fully torn down on unmount. Re-evaluating into the current state does nothing.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::diagnostics::{warn, Warning};
use crate::directives::{detached, Directive, DirectiveContext};
use crate::engine::{clone_node, insert_after, is_template, release_index, remove, template_root};
use crate::error::Result;
use crate::pipeline::mutate_dom;
use crate::runtime::Runtime;
use crate::scope::{add_scope_to_node, ReactiveScope};
use crate::types::{is_truthy, NodeIndex};

thread_local! {
    static CURRENT_IF: RefCell<HashMap<NodeIndex, NodeIndex>> = RefCell::new(HashMap::new());
}

/// The node currently generated by the `if` template `node`.
pub fn current_if_node(node: NodeIndex) -> Option<NodeIndex> {
    CURRENT_IF.with(|current| current.borrow().get(&node).copied())
}

pub(crate) fn reset_conditionals() {
    CURRENT_IF.with(|current| current.borrow_mut().clear());
}

fn show(runtime: &Runtime, node: NodeIndex) {
    if current_if_node(node).is_some() {
        return;
    }
    let Some(content) = template_root(node) else {
        return;
    };

    let clone = clone_node(content);
    add_scope_to_node(clone, ReactiveScope::empty(), Some(node));
    CURRENT_IF.with(|current| current.borrow_mut().insert(node, clone));

    mutate_dom(|| {
        insert_after(node, clone);
        detached(|| runtime.init_tree(clone));
    });
    tracing::trace!(target: "spark_directives", node, clone, "conditional mounted");
}

fn hide(runtime: &Runtime, node: NodeIndex) {
    let Some(clone) = CURRENT_IF.with(|current| current.borrow_mut().remove(&node)) else {
        return;
    };
    mutate_dom(|| {
        runtime.destroy_tree(clone);
        remove(clone);
        release_index(clone);
    });
    tracing::trace!(target: "spark_directives", node, clone, "conditional unmounted");
}

/// `x-if="expr"` on a template.
pub fn if_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    if !is_template(node) {
        warn(Warning::MisplacedDirective { directive: directive.original.clone(), expected: "template", node });
    }

    let getter = cx.evaluate_later(&directive.expression);
    let runtime = cx.runtime().clone();
    let effect_runtime = runtime.clone();
    cx.effect(move || {
        if is_truthy(&getter(None)) {
            show(&effect_runtime, node);
        } else {
            hide(&effect_runtime, node);
        }
    });
    cx.cleanup(move || hide(&runtime, node));
    Ok(())
}
