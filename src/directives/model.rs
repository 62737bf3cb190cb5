//! `model` and `modelable` directives.
//!
//! `x-model="expr"` registers a [`Model`] on its node: a getter and a setter for
//! `expr`. The expression is mirrored into the node's `value` attribute and
//! written back from `input` events (`$event.detail`).
//!
//! `x-modelable="inner"` exposes an expression of a component as the component's
//! model. One microtask after setup (once an `x-model` on the same node has
//! registered), the outer model and the inner expression are entangled and the
//! `input` listener of `x-model` is dropped:
//!
//! ```text
//! div[x-data="{count: 0}"][x-modelable="count"][x-model="total"]
//!
//!     outer: total  ◀──── entangle ────▶  inner: count
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use spark_signals::{effect, untrack};

use super::on::{add_listener, EventModifiers};
use super::{detached, Directive, DirectiveContext};
use crate::diagnostics::{warn, Warning};
use crate::engine::set_attribute;
use crate::error::Result;
use crate::pipeline::{mutate_dom, queue_microtask};
use crate::runtime::Runtime;
use crate::types::{value_to_attribute_string, Cleanup, NodeIndex, Scope, Value};

/// Name the setter binds the incoming value to.
const PLACEHOLDER: &str = "__placeholder";

/// Read/write access to one side of a two-way binding.
#[derive(Clone)]
pub struct Model {
    pub get: Rc<dyn Fn() -> Value>,
    pub set: Rc<dyn Fn(Value)>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").finish_non_exhaustive()
    }
}

struct Registered {
    model: Model,
    listeners: RefCell<Option<Cleanup>>,
}

impl Registered {
    fn remove_listeners(&self) {
        let listeners = self.listeners.borrow_mut().take();
        if let Some(listeners) = listeners {
            listeners();
        }
    }
}

thread_local! {
    static MODELS: RefCell<HashMap<NodeIndex, Rc<Registered>>> = RefCell::new(HashMap::new());
}

/// The model registered on `node` by `x-model`.
pub fn model(node: NodeIndex) -> Option<Model> {
    MODELS.with(|models| models.borrow().get(&node).map(|r| r.model.clone()))
}

pub(crate) fn reset_models() {
    MODELS.with(|models| models.borrow_mut().clear());
}

/// A setter running `expression = value` on the node's scope chain.
fn setter(runtime: &Runtime, node: NodeIndex, expression: &str) -> Rc<dyn Fn(Value)> {
    let runtime = runtime.clone();
    let statement = format!("{expression} = {PLACEHOLDER}");
    Rc::new(move |value| {
        let mut overlay = Scope::new();
        overlay.insert(PLACEHOLDER.to_string(), value);
        if let Err(err) = runtime.execute(node, &statement, Some(overlay)) {
            warn(Warning::Evaluation { node, expression: statement.clone(), message: err.to_string() });
        }
    })
}

// =============================================================================
// Entangle
// =============================================================================

/// Keep two models in sync until the returned cleanup runs.
///
/// The inner side starts from the outer value. Afterwards, a change of the outer
/// value is copied inwards; otherwise a differing inner value is copied outwards.
pub fn entangle(outer: Model, inner: Model) -> Cleanup {
    let first_run = Cell::new(true);
    let last_outer: RefCell<Value> = RefCell::new(Value::Null);

    let stop = detached(|| {
        effect(move || {
            let outer_value = (outer.get)();
            let inner_value = (inner.get)();

            if first_run.replace(false) || outer_value != *last_outer.borrow() {
                untrack(|| (inner.set)(outer_value.clone()));
            } else if outer_value != inner_value {
                untrack(|| (outer.set)(inner_value));
            }
            *last_outer.borrow_mut() = untrack(|| (outer.get)());
        })
    });
    Box::new(stop)
}

// =============================================================================
// Directives
// =============================================================================

/// `x-model="expr"`.
pub fn model_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let expression = directive.expression.trim().to_string();
    let getter = cx.evaluate_later(&expression);
    let set = setter(cx.runtime(), node, &expression);

    let from_input = set.clone();
    let listeners = add_listener(node, "input", EventModifiers::NONE, move |event| {
        from_input(event.detail.clone());
    });

    let reader = getter.clone();
    let registered = Rc::new(Registered {
        model: Model { get: Rc::new(move || reader(None)), set },
        listeners: RefCell::new(Some(listeners)),
    });
    MODELS.with(|models| models.borrow_mut().insert(node, registered));

    cx.effect(move || {
        let value = value_to_attribute_string(&getter(None));
        mutate_dom(|| set_attribute(node, "value", &value));
    });
    cx.cleanup(move || {
        let registered = MODELS.with(|models| models.borrow_mut().remove(&node));
        if let Some(registered) = registered {
            registered.remove_listeners();
        }
    });
    Ok(())
}

/// `x-modelable="inner"`.
pub fn modelable_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let expression = directive.expression.trim().to_string();
    let getter = cx.evaluate_later(&expression);
    let inner = Model {
        get: Rc::new(move || getter(None)),
        set: setter(cx.runtime(), node, &expression),
    };
    (inner.set)(untrack(|| (inner.get)()));

    let alive = Rc::new(Cell::new(true));
    let release: Rc<RefCell<Option<Cleanup>>> = Rc::default();

    let (wiring_alive, slot) = (alive.clone(), release.clone());
    queue_microtask(move || {
        if !wiring_alive.get() {
            return;
        }
        let registered = MODELS.with(|models| models.borrow().get(&node).cloned());
        let Some(registered) = registered else {
            tracing::trace!(target: "spark_directives", node, "modelable without a model");
            return;
        };
        registered.remove_listeners();
        *slot.borrow_mut() = Some(entangle(registered.model.clone(), inner));
        tracing::trace!(target: "spark_directives", node, "model entangled");
    });

    cx.cleanup(move || {
        alive.set(false);
        let stop = release.borrow_mut().take();
        if let Some(stop) = stop {
            stop();
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::take_warnings;
    use crate::directives::{dispatch_event, listener_count, Event};
    use crate::engine::{children, document_root, element, get_attribute, get_text};
    use crate::pipeline::run_microtasks;
    use crate::runtime::reset_all;
    use crate::scope::scope_chain;
    use serde_json::json;

    #[test]
    fn test_model_mirrors_and_reads_input() {
        reset_all();
        let runtime = Runtime::new();
        let node = element("input")
            .attr("x-data", r#"{"name": "spark"}"#)
            .attr("x-model", "name")
            .mount(document_root());
        runtime.init_tree(node);
        assert_eq!(get_attribute(node, "value").as_deref(), Some("spark"));

        dispatch_event(&Event::new("input", node).with_detail(json!("bolt")));
        assert_eq!(scope_chain(node, None).lookup("name"), Some(json!("bolt")));
        assert_eq!(get_attribute(node, "value").as_deref(), Some("bolt"));

        let model = model(node).expect("registered");
        (model.set)(json!("arc"));
        assert_eq!((model.get)(), json!("arc"));

        runtime.destroy_tree(node);
        assert!(super::model(node).is_none());
        assert_eq!(listener_count(node), 0);
    }

    fn mount_counter() -> (Runtime, NodeIndex, NodeIndex) {
        reset_all();
        let runtime = Runtime::new();
        let root = element("section")
            .attr("x-data", r#"{"total": 5}"#)
            .child(
                element("div")
                    .attr("x-data", r#"{"count": 0}"#)
                    .attr("x-modelable", "count")
                    .attr("x-model", "total")
                    .child(element("span").attr("x-text", "count")),
            )
            .mount(document_root());
        runtime.init_tree(root);
        let component = children(root)[0];
        (runtime, root, component)
    }

    #[test]
    fn test_modelable_entangles_after_a_microtask() {
        let (_runtime, root, component) = mount_counter();
        let label = children(component)[0];
        assert_eq!(get_text(label), "0");
        assert_eq!(listener_count(component), 1);

        run_microtasks();
        assert_eq!(get_text(label), "5");
        assert_eq!(listener_count(component), 0, "input listener replaced by the entanglement");

        // Inner to outer.
        scope_chain(component, None).assign("count", json!(7));
        assert_eq!(scope_chain(root, None).lookup("total"), Some(json!(7)));

        // Outer to inner.
        scope_chain(root, None).assign("total", json!(1));
        assert_eq!(scope_chain(component, None).lookup("count"), Some(json!(1)));
        assert_eq!(get_text(label), "1");
    }

    #[test]
    fn test_teardown_before_wiring_never_entangles() {
        let (runtime, root, component) = mount_counter();
        runtime.destroy_tree(component);
        run_microtasks();

        scope_chain(root, None).assign("total", json!(9));
        assert_eq!(scope_chain(root, None).lookup("total"), Some(json!(9)));
        assert!(model(component).is_none());
    }

    #[test]
    fn test_teardown_releases_the_entanglement() {
        let (runtime, root, component) = mount_counter();
        run_microtasks();
        let inner = scope_chain(component, None);
        take_warnings();

        runtime.destroy_tree(component);
        scope_chain(root, None).assign("total", json!(3));
        // The component scope is gone; the old chain still sees the last synced value.
        assert_eq!(inner.lookup("count"), Some(json!(5)));
        assert!(take_warnings().is_empty(), "nothing tried to write into the released side");
    }
}
