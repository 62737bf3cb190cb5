//! Node Tree - Structural operations on the node arrays.
//!
//! Mirrors the handful of DOM operations the directives need: create, clone,
//! insert before/after a sibling, append, detach, and connectivity checks.
//! Every attach/detach is recorded with the mutation batcher.
//!
//! A node is *connected* when walking its parents reaches the document root.
//! Template content lives in a detached fragment and is never connected.

use std::cell::Cell;

use super::arrays::{attrs, core};
use super::registry::{allocate_index, is_allocated};
use crate::pipeline::batch::{record, Mutation};
use crate::types::NodeIndex;

thread_local! {
    static DOCUMENT_ROOT: Cell<Option<usize>> = const { Cell::new(None) };
}

// =============================================================================
// Creation
// =============================================================================

/// The document root, allocated on first use.
pub fn document_root() -> NodeIndex {
    DOCUMENT_ROOT.with(|root| match root.get() {
        Some(index) if is_allocated(index) => index,
        _ => {
            let index = allocate_index("#document");
            root.set(Some(index));
            index
        }
    })
}

/// Forget the document root (for testing; the registry reset frees its index).
pub(crate) fn reset_document_root() {
    DOCUMENT_ROOT.with(|root| root.set(None));
}

/// Create a detached element.
pub fn create_element(tag: &str) -> NodeIndex {
    allocate_index(tag)
}

/// Create a detached `<template>` whose content fragment holds `content`.
pub fn create_template(content: NodeIndex) -> NodeIndex {
    let template = allocate_index("template");
    let fragment = allocate_index("#fragment");
    core::set_template_content(template, Some(fragment));
    append_child(fragment, content);
    template
}

/// The root element of a template's content fragment.
pub fn template_root(template: NodeIndex) -> Option<NodeIndex> {
    let fragment = core::get_template_content(template)?;
    core::get_children(fragment).first().copied()
}

pub fn is_template(node: NodeIndex) -> bool {
    core::get_tag(node) == "template"
}

/// Deep-clone a node: tag, text, attributes, classes, styles, children and template content.
pub fn clone_node(node: NodeIndex) -> NodeIndex {
    let clone = allocate_index(&core::get_tag(node));
    core::set_text(clone, &core::get_text(node));
    for (name, value) in attrs::get_attributes(node) {
        attrs::set_attribute(clone, &name, &value);
    }
    for class in attrs::get_classes(node) {
        attrs::add_class(clone, &class);
    }
    for (property, value) in attrs::get_styles(node) {
        attrs::set_style(clone, &property, &value);
    }
    if let Some(fragment) = core::get_template_content(node) {
        core::set_template_content(clone, Some(clone_node(fragment)));
    }
    for child in core::get_children(node) {
        let child_clone = clone_node(child);
        core::set_parent_index(child_clone, Some(clone));
        core::with_children_mut(clone, |children| children.push(child_clone));
    }
    clone
}

// =============================================================================
// Structure
// =============================================================================

pub fn parent(node: NodeIndex) -> Option<NodeIndex> {
    core::get_parent_index(node)
}

pub fn children(node: NodeIndex) -> Vec<NodeIndex> {
    core::get_children(node)
}

pub fn next_sibling(node: NodeIndex) -> Option<NodeIndex> {
    let parent = core::get_parent_index(node)?;
    let siblings = core::get_children(parent);
    let position = siblings.iter().position(|&c| c == node)?;
    siblings.get(position + 1).copied()
}

pub fn previous_sibling(node: NodeIndex) -> Option<NodeIndex> {
    let parent = core::get_parent_index(node)?;
    let siblings = core::get_children(parent);
    let position = siblings.iter().position(|&c| c == node)?;
    position.checked_sub(1).and_then(|p| siblings.get(p).copied())
}

/// Whether `ancestor` is `node` or one of its ancestors.
pub fn contains(ancestor: NodeIndex, node: NodeIndex) -> bool {
    let mut current = Some(node);
    while let Some(index) = current {
        if index == ancestor {
            return true;
        }
        current = core::get_parent_index(index);
    }
    false
}

/// Whether the node is attached (transitively) to the document root.
pub fn is_connected(node: NodeIndex) -> bool {
    is_allocated(node) && contains(document_root(), node)
}

/// `node` followed by all descendants in document order (template content excluded).
pub fn descendants(node: NodeIndex) -> Vec<NodeIndex> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(index) = stack.pop() {
        out.push(index);
        for child in core::get_children(index).into_iter().rev() {
            stack.push(child);
        }
    }
    out
}

// =============================================================================
// Mutation
// =============================================================================

/// Detach `node` from its parent. Returns whether it was attached.
pub fn remove(node: NodeIndex) -> bool {
    let Some(parent) = core::get_parent_index(node) else {
        return false;
    };
    core::with_children_mut(parent, |children| children.retain(|&c| c != node));
    core::set_parent_index(node, None);
    record(Mutation::Removed { node, parent });
    true
}

fn insert_at(parent: NodeIndex, position: usize, node: NodeIndex) {
    remove(node);
    core::with_children_mut(parent, |children| {
        let position = position.min(children.len());
        children.insert(position, node);
    });
    core::set_parent_index(node, Some(parent));
    record(Mutation::Added { node, parent });
}

/// Append `node` as the last child of `parent`, moving it if already attached.
pub fn append_child(parent: NodeIndex, node: NodeIndex) {
    remove(node);
    let len = core::get_children(parent).len();
    insert_at(parent, len, node);
}

/// Insert `node` right after `reference`. No-op when `reference` is detached.
pub fn insert_after(reference: NodeIndex, node: NodeIndex) -> bool {
    if reference == node {
        return false;
    }
    let Some(parent) = core::get_parent_index(reference) else {
        return false;
    };
    remove(node);
    let position = core::get_children(parent)
        .iter()
        .position(|&c| c == reference)
        .map_or(0, |p| p + 1);
    insert_at(parent, position, node);
    true
}

/// Insert `node` right before `reference`. No-op when `reference` is detached.
pub fn insert_before(reference: NodeIndex, node: NodeIndex) -> bool {
    if reference == node {
        return false;
    }
    let Some(parent) = core::get_parent_index(reference) else {
        return false;
    };
    remove(node);
    let position = core::get_children(parent)
        .iter()
        .position(|&c| c == reference)
        .unwrap_or(0);
    insert_at(parent, position, node);
    true
}
