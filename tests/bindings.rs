//! Binding integration tests.
//!
//! Applies attribute/directive maps through a runtime and checks that reapplying
//! never stacks listeners, that bound classes merge with declared ones, and that
//! an object bound from data stays live.
//!
//! Run with: cargo test --test bindings

use serde_json::json;

use spark_directives::bindings::binding_cleanup_count;
use spark_directives::directives::{dispatch_event, listener_count, Event};
use spark_directives::engine::{document_root, element, get_attribute, get_classes};
use spark_directives::scope::scope_chain;
use spark_directives::{apply_bindings, reset_all, BindingSource, NodeIndex, Runtime};

fn mount(data: &str) -> (Runtime, NodeIndex) {
    reset_all();
    let runtime = Runtime::new();
    let node = element("button").attr("x-data", data).mount(document_root());
    runtime.init_tree(node);
    (runtime, node)
}

fn click(node: NodeIndex) -> usize {
    dispatch_event(&Event::new("click", node))
}

// =============================================================================
// IDEMPOTENCE
// =============================================================================

#[test]
fn test_reapplying_the_same_map_never_stacks() {
    let (runtime, node) = mount(r#"{"open": true}"#);
    let source = BindingSource::from_pairs([
        ("@click", json!("open = !open")),
        (":title", json!("open")),
        ("role", json!("switch")),
    ]);

    let _first = apply_bindings(&runtime, node, &source);
    let count = binding_cleanup_count(node);
    let _second = apply_bindings(&runtime, node, &source);
    let _third = apply_bindings(&runtime, node, &source);

    assert_eq!(binding_cleanup_count(node), count);
    assert_eq!(listener_count(node), 1);
    assert_eq!(get_attribute(node, "role").as_deref(), Some("switch"));
    assert_eq!(get_attribute(node, "title").as_deref(), Some("true"));

    assert_eq!(click(node), 1);
    assert_eq!(scope_chain(node, None).lookup("open"), Some(json!(false)));
    assert_eq!(get_attribute(node, "title"), None);
}

#[test]
fn test_cleanup_detaches_everything_it_attached() {
    let (runtime, node) = mount(r#"{"open": true}"#);
    let cleanup = apply_bindings(
        &runtime,
        node,
        &BindingSource::from_pairs([("@click", json!("open = !open")), (":class", json!("'on'"))]),
    );
    assert_eq!(listener_count(node), 1);
    assert_eq!(get_classes(node), vec!["on"]);

    cleanup();
    assert_eq!(listener_count(node), 0);
    assert!(get_classes(node).is_empty());
    assert_eq!(click(node), 0);
}

// =============================================================================
// CLASS MERGING
// =============================================================================

#[test]
fn test_bound_classes_merge_with_declared_ones() {
    reset_all();
    let runtime = Runtime::new();
    let node = element("div")
        .attr("class", "base")
        .attr("x-data", r#"{"classes": {"active": true}}"#)
        .attr(":class", "classes")
        .mount(document_root());
    runtime.init_tree(node);
    assert_eq!(get_classes(node), vec!["base", "active"]);

    scope_chain(node, None).assign("classes", json!({"active": false, "base": false}));
    assert!(get_classes(node).is_empty());

    scope_chain(node, None).assign("classes", json!("extra"));
    assert_eq!(get_classes(node), vec!["base", "extra"]);

    runtime.destroy_tree(node);
    assert_eq!(get_classes(node), vec!["base"]);
}

// =============================================================================
// OBJECT BINDINGS
// =============================================================================

#[test]
fn test_object_bound_from_data_stays_live() {
    let (runtime, node) = mount(
        r#"{"open": false, "trigger": {"@click": "open = !open", ":aria-expanded": "open"}}"#,
    );
    let target = element("span").attr("x-bind", "trigger").mount(node);
    runtime.init_tree(target);

    assert_eq!(get_attribute(target, "aria-expanded").as_deref(), Some("false"));
    assert_eq!(listener_count(target), 1);

    click(target);
    assert_eq!(get_attribute(target, "aria-expanded").as_deref(), Some("true"));

    scope_chain(node, None).assign(
        "trigger",
        json!({"@click": "open = !open", ":aria-expanded": "open", "id": "toggle"}),
    );
    assert_eq!(listener_count(target), 1);
    assert_eq!(get_attribute(target, "id").as_deref(), Some("toggle"));

    click(target);
    assert_eq!(get_attribute(target, "aria-expanded").as_deref(), Some("false"));
}
