//! `data`, `init` and `text` directives.

use super::{Directive, DirectiveContext};
use crate::engine::set_text;
use crate::error::{DirectiveError, Result};
use crate::pipeline::mutate_dom;
use crate::scope::{add_scope_to_node, remove_scope, ReactiveScope};
use crate::types::{value_to_attribute_string, NodeIndex, Value};

/// `x-data="{...}"`: attach a root reactive scope to the node.
pub fn data_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let value = if directive.expression.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        cx.evaluate(&directive.expression)?
    };
    let Value::Object(fields) = value else {
        return Err(DirectiveError::parse(&directive.expression, "data must evaluate to an object"));
    };

    add_scope_to_node(node, ReactiveScope::new(fields), None);
    cx.cleanup(move || remove_scope(node));
    Ok(())
}

/// `x-init="statement"`: run once when the node is initialized.
pub fn init_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    if directive.expression.trim().is_empty() {
        return Ok(());
    }
    cx.runtime().execute(node, &directive.expression, None)?;
    Ok(())
}

/// `x-text="expr"`: keep the node's text in sync with an expression.
pub fn text_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let getter = cx.evaluate_later(&directive.expression);
    cx.effect(move || {
        let text = value_to_attribute_string(&getter(None));
        mutate_dom(|| set_text(node, &text));
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::diagnostics::{take_warnings, Warning};
    use crate::engine::{document_root, element, get_text};
    use crate::runtime::{reset_all, Runtime};
    use crate::scope::scope_chain;
    use serde_json::json;

    #[test]
    fn test_data_and_text() {
        reset_all();
        let runtime = Runtime::new();
        let root = element("div")
            .attr("x-data", r#"{"name": "spark"}"#)
            .child(element("span").attr("x-text", "name"))
            .mount(document_root());
        runtime.init_tree(root);

        let span = crate::engine::children(root)[0];
        assert_eq!(get_text(span), "spark");

        scope_chain(root, None).assign("name", json!("signals"));
        assert_eq!(get_text(span), "signals");
    }

    #[test]
    fn test_init_runs_statement() {
        reset_all();
        let runtime = Runtime::new();
        let root = element("div")
            .attr("x-data", r#"{"ready": false}"#)
            .attr("x-init", "ready = true")
            .mount(document_root());
        runtime.init_tree(root);

        assert_eq!(scope_chain(root, None).lookup("ready"), Some(json!(true)));
    }

    #[test]
    fn test_non_object_data_is_reported() {
        reset_all();
        let runtime = Runtime::new();
        let root = element("div").attr("x-data", "[1, 2]").mount(document_root());
        runtime.init_tree(root);

        let warnings = take_warnings();
        assert!(matches!(
            warnings.as_slice(),
            [Warning::DirectiveFailed { directive, .. }] if directive == "x-data"
        ));
    }
}
