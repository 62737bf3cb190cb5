//! Keyed list integration tests.
//!
//! Drives the `for` directive through a real runtime: node identity across
//! passes, scope refresh, add/remove anchoring, duplicate keys, teardown and
//! conditionals generated inside list items.
//!
//! Run with: cargo test --test lists

use proptest::prelude::*;
use serde_json::{json, Value};

use spark_directives::engine::{children, document_root, element, get_text, is_allocated, template};
use spark_directives::reconcile::{last_diff, rendered_keys, rendered_node, rendered_nodes, Anchor};
use spark_directives::scope::scope_chain;
use spark_directives::{reset_all, take_warnings, Key, NodeIndex, Runtime, Warning};

// =============================================================================
// HELPERS
// =============================================================================

struct List {
    runtime: Runtime,
    root: NodeIndex,
    anchor: NodeIndex,
}

fn mount_list(items: Value, text: &str, key: Option<&str>) -> List {
    reset_all();
    let runtime = Runtime::new();
    let mut for_template = template(element("li").attr("x-text", text)).attr("x-for", "item in items");
    if let Some(key) = key {
        for_template = for_template.attr(":key", key);
    }
    let data = json!({ "items": items }).to_string();
    let root = element("ul").attr("x-data", &data).child(for_template).mount(document_root());
    runtime.init_tree(root);
    let anchor = children(root)[0];
    List { runtime, root, anchor }
}

fn set_items(list: &List, items: Value) {
    assert!(scope_chain(list.root, None).assign("items", items));
}

/// Text of every rendered item, in tree order.
fn texts(list: &List) -> Vec<String> {
    children(list.root).into_iter().skip(1).map(get_text).collect()
}

fn ids(list: &[i64]) -> Vec<Key> {
    list.iter().map(|&id| Key::Int(id)).collect()
}

// =============================================================================
// IDENTITY
// =============================================================================

#[test]
fn test_same_keys_same_order_keeps_every_node() {
    let list = mount_list(
        json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}, {"id": 3, "v": "c"}]),
        "item.v",
        Some("item.id"),
    );
    let before = rendered_nodes(list.anchor);
    assert_eq!(texts(&list), vec!["a", "b", "c"]);

    set_items(&list, json!([{"id": 1, "v": "A"}, {"id": 2, "v": "B"}, {"id": 3, "v": "C"}]));

    let diff = last_diff(list.anchor).expect("list state");
    assert!(diff.is_noop());
    assert_eq!(diff.sames, ids(&[1, 2, 3]));
    assert_eq!(rendered_nodes(list.anchor), before);
    assert_eq!(texts(&list), vec!["A", "B", "C"]);
}

#[test]
fn test_reorder_by_id_moves_and_refreshes() {
    let list = mount_list(
        json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]),
        "item.v",
        Some("item.id"),
    );
    let first = rendered_node(list.anchor, &Key::Int(1)).expect("rendered");
    let second = rendered_node(list.anchor, &Key::Int(2)).expect("rendered");

    set_items(&list, json!([{"id": 2, "v": "b"}, {"id": 1, "v": "a2"}]));

    let diff = last_diff(list.anchor).expect("list state");
    assert_eq!(diff.moves.len(), 1);
    assert!(diff.adds.is_empty());
    assert!(diff.removes.is_empty());

    assert_eq!(rendered_node(list.anchor, &Key::Int(1)), Some(first));
    assert_eq!(rendered_node(list.anchor, &Key::Int(2)), Some(second));
    assert_eq!(children(list.root), vec![list.anchor, second, first]);
    assert_eq!(get_text(first), "a2");
}

#[test]
fn test_item_bindings_follow_every_pass() {
    let list = mount_list(json!([{"id": 1, "v": "a"}]), "item.v", Some("item.id"));
    let node = rendered_node(list.anchor, &Key::Int(1)).expect("rendered");
    assert_eq!(texts(&list), vec!["a"]);

    set_items(&list, json!([{"id": 1, "v": "b"}]));
    assert_eq!(get_text(node), "b");

    set_items(&list, json!([{"id": 1, "v": "c"}]));
    assert_eq!(get_text(node), "c");

    set_items(&list, json!([{"id": 2, "v": "x"}, {"id": 1, "v": "d"}]));
    assert_eq!(rendered_node(list.anchor, &Key::Int(1)), Some(node));
    assert_eq!(texts(&list), vec!["x", "d"]);
}

// =============================================================================
// ADDS AND REMOVES
// =============================================================================

#[test]
fn test_shift_window_removes_head_and_appends_tail() {
    let list = mount_list(json!([1, 2, 3]), "item", Some("item"));
    let two = rendered_node(list.anchor, &Key::Int(2)).expect("rendered");
    let three = rendered_node(list.anchor, &Key::Int(3)).expect("rendered");

    set_items(&list, json!([2, 3, 4]));

    let diff = last_diff(list.anchor).expect("list state");
    assert_eq!(diff.removes, ids(&[1]));
    assert!(diff.moves.is_empty());
    assert_eq!(diff.adds, vec![(Anchor::After(Key::Int(3)), 2)]);

    assert_eq!(texts(&list), vec!["2", "3", "4"]);
    assert_eq!(rendered_node(list.anchor, &Key::Int(2)), Some(two));
    assert_eq!(rendered_node(list.anchor, &Key::Int(3)), Some(three));
    // The added item may reuse the released index, so check membership instead.
    assert_eq!(rendered_node(list.anchor, &Key::Int(1)), None);
    let four = rendered_node(list.anchor, &Key::Int(4)).expect("rendered");
    assert_eq!(children(list.root), vec![list.anchor, two, three, four]);
}

#[test]
fn test_numeric_range_and_default_index_keys() {
    let list = mount_list(json!(3), "item", None);
    assert_eq!(texts(&list), vec!["1", "2", "3"]);
    assert_eq!(rendered_keys(list.anchor), ids(&[0, 1, 2]));

    set_items(&list, json!(["z", "y"]));
    assert_eq!(texts(&list), vec!["z", "y"]);
    let diff = last_diff(list.anchor).expect("list state");
    assert_eq!(diff.removes, ids(&[2]));
    assert_eq!(diff.sames, ids(&[0, 1]));
}

#[test]
fn test_empty_and_null_sources() {
    let list = mount_list(json!(null), "item", None);
    assert!(texts(&list).is_empty());

    set_items(&list, json!(["a"]));
    assert_eq!(texts(&list), vec!["a"]);

    set_items(&list, json!([]));
    assert!(texts(&list).is_empty());
    assert!(rendered_keys(list.anchor).is_empty());
}

// =============================================================================
// ANOMALIES
// =============================================================================

#[test]
fn test_duplicate_keys_warn_and_stay_consistent() {
    let list = mount_list(
        json!([{"id": 1, "v": "a"}, {"id": 1, "v": "b"}, {"id": 2, "v": "c"}]),
        "item.v",
        Some("item.id"),
    );

    let warnings = take_warnings();
    assert!(warnings.iter().any(|w| matches!(w, Warning::DuplicateKey { key, .. } if key == "1")));
    assert_eq!(rendered_keys(list.anchor), ids(&[1, 2]));
    assert_eq!(texts(&list), vec!["a", "c"]);

    set_items(&list, json!([{"id": 2, "v": "c"}, {"id": 2, "v": "d"}, {"id": 3, "v": "e"}]));
    assert!(!take_warnings().is_empty());
    for key in rendered_keys(list.anchor) {
        assert!(rendered_node(list.anchor, &key).is_some(), "key {key} has no node");
    }
    assert_eq!(texts(&list), vec!["c", "e"]);
}

#[test]
fn test_composite_keys_warn() {
    let _list = mount_list(json!([{"id": [1]}]), "item.id", Some("item.id"));
    assert!(take_warnings().iter().any(|w| matches!(w, Warning::CompositeKey { .. })));
}

#[test]
fn test_for_on_plain_element_warns() {
    reset_all();
    let runtime = Runtime::new();
    let node = element("li").attr("x-for", "item in items").mount(document_root());
    runtime.init_tree(node);

    assert!(take_warnings().iter().any(|w| matches!(
        w,
        Warning::MisplacedDirective { expected: "template", .. }
    )));
}

// =============================================================================
// TEARDOWN AND NESTING
// =============================================================================

#[test]
fn test_teardown_destroys_every_item() {
    let list = mount_list(json!([1, 2, 3]), "item", Some("item"));
    let nodes = rendered_nodes(list.anchor);
    assert_eq!(nodes.len(), 3);

    list.runtime.destroy_tree(list.root);

    assert!(nodes.iter().all(|&node| !is_allocated(node)));
    assert!(rendered_keys(list.anchor).is_empty());
    assert_eq!(children(list.root), vec![list.anchor]);
}

#[test]
fn test_destroying_an_updated_list_anchor() {
    let list = mount_list(json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]), "item.v", Some("item.id"));
    set_items(&list, json!([{"id": 2, "v": "b2"}, {"id": 1, "v": "a2"}, {"id": 3, "v": "c"}]));
    assert_eq!(texts(&list), vec!["b2", "a2", "c"]);

    list.runtime.destroy_tree(list.anchor);
    assert_eq!(children(list.root), vec![list.anchor]);
    assert!(rendered_nodes(list.anchor).is_empty());

    // The source no longer drives the tree.
    set_items(&list, json!([{"id": 4, "v": "d"}]));
    assert_eq!(children(list.root), vec![list.anchor]);
}

#[test]
fn test_conditional_items_move_with_their_template() {
    reset_all();
    let runtime = Runtime::new();
    let item = template(element("li").attr("x-text", "item.v")).attr("x-if", "item.show");
    let data = json!({ "items": [{"id": 1, "v": "a", "show": true}, {"id": 2, "v": "b", "show": true}] });
    let root = element("ul")
        .attr("x-data", &data.to_string())
        .child(template(item).attr("x-for", "item in items").attr(":key", "item.id"))
        .mount(document_root());
    runtime.init_tree(root);
    let anchor = children(root)[0];

    let texts = |root: NodeIndex| -> Vec<String> {
        children(root).into_iter().map(get_text).filter(|t| !t.is_empty()).collect()
    };
    assert_eq!(children(root).len(), 5);
    assert_eq!(texts(root), vec!["a", "b"]);

    scope_chain(root, None).assign(
        "items",
        json!([{"id": 2, "v": "b", "show": true}, {"id": 1, "v": "a", "show": true}]),
    );
    assert_eq!(texts(root), vec!["b", "a"]);

    // Each generated conditional node sits right after its own template.
    let tree = children(root);
    let two = rendered_node(anchor, &Key::Int(2)).expect("rendered");
    let one = rendered_node(anchor, &Key::Int(1)).expect("rendered");
    assert_eq!(tree[1], two);
    assert_eq!(tree[3], one);

    scope_chain(root, None).assign(
        "items",
        json!([{"id": 2, "v": "b", "show": true}, {"id": 3, "v": "c", "show": true}, {"id": 1, "v": "a", "show": true}]),
    );
    assert_eq!(texts(root), vec!["b", "c", "a"]);

    runtime.destroy_tree(root);
    assert_eq!(children(root), vec![anchor]);
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// A few passes, each some subset of `0..8` in some order.
fn passes() -> impl Strategy<Value = Vec<Vec<i64>>> {
    let pass = prop::sample::subsequence((0..8).collect::<Vec<i64>>(), 0..=8).prop_shuffle();
    prop::collection::vec(pass, 1..6)
}

proptest! {
    #[test]
    fn prop_tree_order_matches_rendered_keys(passes in passes()) {
        let list = mount_list(json!(passes[0]), "item", Some("item"));
        for pass in &passes {
            set_items(&list, json!(pass));

            let tree = children(list.root);
            let rendered = rendered_nodes(list.anchor);
            prop_assert_eq!(&tree[1..], &rendered[..]);
            prop_assert_eq!(rendered_keys(list.anchor), ids(pass));
            let expected: Vec<String> = pass.iter().map(|k| k.to_string()).collect();
            prop_assert_eq!(texts(&list), expected);
        }
    }
}
