//! Transitions - Descriptors, the run state machine and show/hide cascading.
//!
//! - [`descriptor`]: per-node enter/leave phase values (helper or class strings)
//! - [`machine`]: [`perform_transition`] and the [`TransitionHandle`] it returns
//! - [`toggle`]: [`toggle_with_transitions`], deferring shows and ordering nested hides
//!
//! Per-node state lives in side tables here: the descriptor, the run in flight,
//! and the pending hide task. All three are dropped when the node is released.

pub mod descriptor;
pub mod machine;
pub mod toggle;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::diagnostics::{warn, Warning};
use crate::directives::{Directive, DirectiveContext};
use crate::engine::on_destroy;
use crate::error::Result;
use crate::types::NodeIndex;

pub use descriptor::{modifier_value, Phases, TransitionDescriptor, TransitionMode};
pub use machine::{
    perform_transition, transition, transition_in, transition_out, Hook, TransitionHandle,
    TransitionState, TransitionStages,
};
pub use toggle::{hide_outcome, toggle_with_transitions, HideOutcome};

thread_local! {
    static DESCRIPTORS: RefCell<HashMap<NodeIndex, TransitionDescriptor>> = RefCell::new(HashMap::new());
    static ACTIVE: RefCell<HashMap<NodeIndex, TransitionHandle>> = RefCell::new(HashMap::new());
    static TRACKED: RefCell<HashSet<NodeIndex>> = RefCell::new(HashSet::new());
}

/// Drop every transition side table entry for `node` once it is released.
fn track(node: NodeIndex) {
    let fresh = TRACKED.with(|tracked| tracked.borrow_mut().insert(node));
    if fresh {
        on_destroy(node, move || {
            TRACKED.with(|tracked| tracked.borrow_mut().remove(&node));
            DESCRIPTORS.with(|d| d.borrow_mut().remove(&node));
            let active = ACTIVE.with(|a| a.borrow_mut().remove(&node));
            if let Some(active) = active {
                active.abandon();
            }
            toggle::forget_hide(node);
        });
    }
}

// =============================================================================
// Side tables
// =============================================================================

/// A copy of the node's descriptor.
pub fn descriptor(node: NodeIndex) -> Option<TransitionDescriptor> {
    DESCRIPTORS.with(|d| d.borrow().get(&node).cloned())
}

/// Edit the node's descriptor, creating it with `mode` if missing.
///
/// An existing descriptor keeps its original mode.
pub fn with_descriptor<R>(
    node: NodeIndex,
    mode: TransitionMode,
    f: impl FnOnce(&mut TransitionDescriptor) -> R,
) -> R {
    track(node);
    DESCRIPTORS.with(|d| {
        let mut descriptors = d.borrow_mut();
        let descriptor = descriptors.entry(node).or_insert_with(|| TransitionDescriptor::new(mode));
        f(descriptor)
    })
}

/// The run in flight on `node`, if any.
pub fn active_transition(node: NodeIndex) -> Option<TransitionHandle> {
    ACTIVE.with(|a| a.borrow().get(&node).cloned())
}

pub(crate) fn set_active_transition(node: NodeIndex, handle: TransitionHandle) {
    track(node);
    ACTIVE.with(|a| a.borrow_mut().insert(node, handle));
}

pub(crate) fn clear_active_transition(node: NodeIndex) {
    ACTIVE.with(|a| a.borrow_mut().remove(&node));
}

pub(crate) fn reset_transitions() {
    DESCRIPTORS.with(|d| d.borrow_mut().clear());
    ACTIVE.with(|a| a.borrow_mut().clear());
    TRACKED.with(|tracked| tracked.borrow_mut().clear());
    toggle::reset_hides();
}

// =============================================================================
// transition directive
// =============================================================================

/// `x-transition[.modifiers]` (helper) or `x-transition:<stage>="classes"`.
pub fn transition_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let expression = directive.expression.trim();
    if expression == "false" {
        return Ok(());
    }

    if expression.is_empty() || expression == "true" {
        let defaults = cx.runtime().config().transition.clone();
        with_descriptor(node, TransitionMode::Styles, |d| {
            descriptor::apply_helper(d, &directive.modifiers, &directive.value, &defaults)
        });
        return Ok(());
    }

    if directive.value.is_empty() {
        warn(Warning::MissingTransitionStage { node });
        return Ok(());
    }
    let known = with_descriptor(node, TransitionMode::Classes, |d| {
        descriptor::apply_class_stage(d, &directive.value, expression)
    });
    if !known {
        warn(Warning::UnknownTransitionStage { node, stage: directive.value.clone() });
    }
    Ok(())
}
