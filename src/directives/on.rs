//! `on` directive - Event listeners and dispatch.
//!
//! Listeners live in a side table keyed by node. [`dispatch_event`] bubbles an
//! event from its target up to the document root, then notifies `.outside`
//! listeners whose node does not contain the target.
//!
//! ```ignore
//! // @click.outside="open = false"
//! dispatch_event(&Event::new("click", elsewhere));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::json;

use super::{Directive, DirectiveContext};
use crate::diagnostics::{warn, Warning};
use crate::engine::{computed_style, contains, is_connected, on_destroy, parent};
use crate::error::Result;
use crate::types::{Cleanup, NodeIndex, Scope, Value};

bitflags::bitflags! {
    /// Listener modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventModifiers: u8 {
        const NONE    = 0;
        const ONCE    = 1 << 0;
        const STOP    = 1 << 1;
        const SELF    = 1 << 2;
        const OUTSIDE = 1 << 3;
    }
}

impl EventModifiers {
    /// Collect the modifiers named on a directive (`.away` is an alias of `.outside`).
    pub fn from_names(names: &[String]) -> Self {
        names.iter().fold(Self::NONE, |flags, name| {
            flags
                | match name.as_str() {
                    "once" => Self::ONCE,
                    "stop" => Self::STOP,
                    "self" => Self::SELF,
                    "outside" | "away" => Self::OUTSIDE,
                    _ => Self::NONE,
                }
        })
    }
}

/// A dispatched event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: String,
    pub target: NodeIndex,
    pub detail: Value,
}

impl Event {
    pub fn new(kind: &str, target: NodeIndex) -> Self {
        Self { kind: kind.to_string(), target, detail: Value::Null }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    /// The `$event` value seen by handler expressions.
    pub fn to_value(&self) -> Value {
        json!({ "type": self.kind, "target": self.target, "detail": self.detail })
    }
}

type Handler = Rc<dyn Fn(&Event)>;

struct Listener {
    id: u64,
    kind: String,
    modifiers: EventModifiers,
    handler: Handler,
}

thread_local! {
    static LISTENERS: RefCell<HashMap<NodeIndex, Vec<Listener>>> = RefCell::new(HashMap::new());
    static NEXT_LISTENER_ID: Cell<u64> = const { Cell::new(0) };
}

// =============================================================================
// Listener Table
// =============================================================================

/// Attach a listener. The returned cleanup detaches it.
pub fn add_listener(
    node: NodeIndex,
    kind: &str,
    modifiers: EventModifiers,
    handler: impl Fn(&Event) + 'static,
) -> Cleanup {
    let id = NEXT_LISTENER_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    let first = LISTENERS.with(|listeners| {
        let mut listeners = listeners.borrow_mut();
        let entry = listeners.entry(node).or_default();
        let first = entry.is_empty();
        entry.push(Listener { id, kind: kind.to_string(), modifiers, handler: Rc::new(handler) });
        first
    });
    if first {
        on_destroy(node, move || {
            LISTENERS.with(|listeners| listeners.borrow_mut().remove(&node));
        });
    }
    Box::new(move || remove_listener(node, id))
}

fn remove_listener(node: NodeIndex, id: u64) {
    LISTENERS.with(|listeners| {
        if let Some(entry) = listeners.borrow_mut().get_mut(&node) {
            entry.retain(|l| l.id != id);
        }
    });
}

/// Number of listeners attached to `node`.
pub fn listener_count(node: NodeIndex) -> usize {
    LISTENERS.with(|listeners| listeners.borrow().get(&node).map_or(0, Vec::len))
}

pub(crate) fn reset_listeners() {
    LISTENERS.with(|listeners| listeners.borrow_mut().clear());
    NEXT_LISTENER_ID.with(|next| next.set(0));
}

fn matching(node: NodeIndex, kind: &str, outside: bool) -> Vec<(u64, EventModifiers, Handler)> {
    LISTENERS.with(|listeners| {
        listeners
            .borrow()
            .get(&node)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|l| l.kind == kind && l.modifiers.contains(EventModifiers::OUTSIDE) == outside)
                    .map(|l| (l.id, l.modifiers, l.handler.clone()))
                    .collect()
            })
            .unwrap_or_default()
    })
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatch `event`. Returns how many handlers ran.
pub fn dispatch_event(event: &Event) -> usize {
    let mut ran = 0;

    let mut current = Some(event.target);
    'bubble: while let Some(node) = current {
        for (id, modifiers, handler) in matching(node, &event.kind, false) {
            if modifiers.contains(EventModifiers::SELF) && node != event.target {
                continue;
            }
            if modifiers.contains(EventModifiers::ONCE) {
                remove_listener(node, id);
            }
            handler(event);
            ran += 1;
            if modifiers.contains(EventModifiers::STOP) {
                break 'bubble;
            }
        }
        current = parent(node);
    }

    let outside_nodes: Vec<NodeIndex> = LISTENERS.with(|listeners| {
        let mut nodes: Vec<NodeIndex> = listeners
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.iter().any(|l| l.modifiers.contains(EventModifiers::OUTSIDE)))
            .map(|(node, _)| *node)
            .collect();
        nodes.sort_unstable();
        nodes
    });
    for node in outside_nodes {
        // Hidden or detached nodes can't be clicked away from.
        if contains(node, event.target)
            || !is_connected(node)
            || computed_style(node, "display").as_deref() == Some("none")
        {
            continue;
        }
        for (id, modifiers, handler) in matching(node, &event.kind, true) {
            if modifiers.contains(EventModifiers::ONCE) {
                remove_listener(node, id);
            }
            handler(event);
            ran += 1;
        }
    }

    ran
}

// =============================================================================
// Directive
// =============================================================================

/// `x-on:event.modifiers="statement"` / `@event="statement"`.
pub fn on_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let runtime = cx.runtime().clone();
    let expression = directive.expression.clone();
    let modifiers = EventModifiers::from_names(&directive.modifiers);

    let remove = add_listener(node, &directive.value, modifiers, move |event| {
        if expression.trim().is_empty() {
            return;
        }
        let mut overlay = Scope::new();
        overlay.insert("$event".to_string(), event.to_value());
        if let Err(err) = runtime.execute(node, &expression, Some(overlay)) {
            warn(Warning::Evaluation { node, expression: expression.clone(), message: err.to_string() });
        }
    });
    cx.cleanup(remove);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{append_child, create_element, document_root, reset_document};

    fn counter() -> (Rc<Cell<usize>>, impl Fn(&Event) + 'static) {
        let count = Rc::new(Cell::new(0));
        let clone = count.clone();
        (count, move |_: &Event| clone.set(clone.get() + 1))
    }

    fn tree() -> (NodeIndex, NodeIndex, NodeIndex) {
        reset_document();
        reset_listeners();
        let outer = create_element("div");
        let inner = create_element("button");
        let other = create_element("p");
        append_child(document_root(), outer);
        append_child(outer, inner);
        append_child(document_root(), other);
        (outer, inner, other)
    }

    #[test]
    fn test_bubbles_and_stops() {
        let (outer, inner, _) = tree();
        let (outer_count, outer_handler) = counter();
        let (inner_count, inner_handler) = counter();
        let _a = add_listener(outer, "click", EventModifiers::NONE, outer_handler);
        let _b = add_listener(inner, "click", EventModifiers::NONE, inner_handler);

        assert_eq!(dispatch_event(&Event::new("click", inner)), 2);
        assert_eq!((outer_count.get(), inner_count.get()), (1, 1));

        let _c = add_listener(inner, "click", EventModifiers::STOP, |_| {});
        dispatch_event(&Event::new("click", inner));
        assert_eq!(outer_count.get(), 1, "stop prevents bubbling");
    }

    #[test]
    fn test_once_and_self() {
        let (outer, inner, _) = tree();
        let (once_count, once_handler) = counter();
        let (self_count, self_handler) = counter();
        let _a = add_listener(inner, "click", EventModifiers::ONCE, once_handler);
        let _b = add_listener(outer, "click", EventModifiers::SELF, self_handler);

        dispatch_event(&Event::new("click", inner));
        dispatch_event(&Event::new("click", inner));
        assert_eq!(once_count.get(), 1);
        assert_eq!(self_count.get(), 0);

        dispatch_event(&Event::new("click", outer));
        assert_eq!(self_count.get(), 1);
    }

    #[test]
    fn test_outside() {
        let (outer, inner, other) = tree();
        let (count, handler) = counter();
        let _a = add_listener(outer, "click", EventModifiers::OUTSIDE, handler);

        dispatch_event(&Event::new("click", inner));
        assert_eq!(count.get(), 0);

        dispatch_event(&Event::new("click", other));
        assert_eq!(count.get(), 1);

        crate::engine::set_style(outer, "display", "none");
        dispatch_event(&Event::new("click", other));
        assert_eq!(count.get(), 1, "hidden nodes ignore outside clicks");
    }

    #[test]
    fn test_cleanup_detaches() {
        let (outer, _, _) = tree();
        let remove = add_listener(outer, "click", EventModifiers::NONE, |_| {});
        assert_eq!(listener_count(outer), 1);
        remove();
        assert_eq!(listener_count(outer), 0);
    }

    #[test]
    fn test_modifier_names() {
        let names: Vec<String> = ["outside", "once", "prevent"].iter().map(|s| s.to_string()).collect();
        assert_eq!(EventModifiers::from_names(&names), EventModifiers::OUTSIDE | EventModifiers::ONCE);
    }
}
