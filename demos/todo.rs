//! Todo Example - Keyed list, conditionals and transitions
//!
//! This example drives a small todo list through the directive runtime:
//! - `x-for` with a `:key` keeps each row's node across reorders
//! - `x-if` mounts the "done" badge only for finished items
//! - `x-show` + `x-transition` fades the empty-state message
//!
//! Run with: RUST_LOG=spark_directives=debug cargo run --example todo

use serde_json::json;
use tracing_subscriber::EnvFilter;

use spark_directives::directives::{dispatch_event, Event};
use spark_directives::prelude::*;
use spark_directives::scope::scope_chain;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    println!("=== spark-directives Todo Example ===\n");

    let config = EngineConfig { default_key_expression: "item.id".to_string(), ..Default::default() };
    let runtime = Runtime::builder().config(config).build();

    let data = json!({
        "empty": false,
        "todos": [
            {"id": 1, "title": "write the reconciler", "done": true},
            {"id": 2, "title": "wire transitions", "done": false},
            {"id": 3, "title": "ship it", "done": false},
        ],
    });

    let row = element("li")
        .attr(":id", "item.title")
        .child(element("span").attr("x-text", "item.title"))
        .child(template(element("em").text("done")).attr("x-if", "item.done"));

    let root = element("section")
        .attr("x-data", &data.to_string())
        .child(element("ul").child(template(row).attr("x-for", "item in todos")))
        .child(
            element("p")
                .attr("x-show", "empty")
                .attr("x-transition", "")
                .text("Nothing left to do"),
        )
        .child(element("button").attr("@click", "empty = !empty").text("toggle"))
        .mount(document_root());

    runtime.start();
    println!("Initial:\n  {}\n", outer_html(root));

    // Reorder: every row keeps its node, only the DOM order changes.
    let scope = scope_chain(root, None);
    scope.assign(
        "todos",
        json!([
            {"id": 3, "title": "ship it", "done": false},
            {"id": 1, "title": "write the reconciler", "done": true},
            {"id": 2, "title": "wire transitions", "done": true},
        ]),
    );
    println!("Reordered:\n  {}\n", text_content(root));

    // Shrink the list and flip the empty-state flag through an event.
    scope.assign("todos", json!([]));
    let button = spark_directives::engine::children(root)[2];
    dispatch_event(&Event::new("click", button));
    run_until_idle();
    println!("Emptied:\n  {}\n", outer_html(root));

    let warnings = take_warnings();
    println!("Warnings: {}", warnings.len());
    for warning in warnings {
        println!("  {warning}");
    }
}
