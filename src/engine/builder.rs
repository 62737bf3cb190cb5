//! Node builder and serializer.
//!
//! ```ignore
//! let list = element("ul")
//!     .child(
//!         template(element("li").attr("x-text", "item.name"))
//!             .attr("x-for", "item in items")
//!             .attr(":key", "item.id"),
//!     )
//!     .mount(document_root());
//!
//! assert_eq!(outer_html(list), "<ul><template x-for=\"item in items\" :key=\"item.id\"></template></ul>");
//! ```

use super::arrays::{attrs, core};
use super::tree::{append_child, create_element, create_template};
use crate::types::NodeIndex;

/// Declarative description of a subtree.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<NodeSpec>,
    content: Option<Box<NodeSpec>>,
}

/// Describe an element.
pub fn element(tag: &str) -> NodeSpec {
    NodeSpec { tag: tag.to_string(), ..Default::default() }
}

/// Describe a `<template>` whose content is `content`.
pub fn template(content: NodeSpec) -> NodeSpec {
    NodeSpec {
        tag: "template".to_string(),
        content: Some(Box::new(content)),
        ..Default::default()
    }
}

impl NodeSpec {
    /// Add an attribute. `class` and `style` go to the class list / inline styles.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Create the subtree, detached.
    pub fn build(self) -> NodeIndex {
        let node = match self.content {
            Some(content) => create_template(content.build()),
            None => create_element(&self.tag),
        };
        for (name, value) in &self.attributes {
            match name.as_str() {
                "class" => value.split_whitespace().for_each(|c| {
                    attrs::add_class(node, c);
                }),
                "style" => {
                    for (property, value) in super::style::parse_style_string(value) {
                        attrs::set_style(node, &property, &value);
                    }
                }
                _ => attrs::set_attribute(node, name, value),
            }
        }
        if let Some(text) = &self.text {
            core::set_text(node, text);
        }
        for child in self.children {
            let child = child.build();
            append_child(node, child);
        }
        node
    }

    /// Create the subtree and append it to `parent`.
    pub fn mount(self, parent: NodeIndex) -> NodeIndex {
        let node = self.build();
        append_child(parent, node);
        node
    }
}

// =============================================================================
// Serialization
// =============================================================================

/// Markup for a node and its children (template content is not serialized).
pub fn outer_html(node: NodeIndex) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

fn write_node(node: NodeIndex, out: &mut String) {
    let tag = core::get_tag(node);
    out.push('<');
    out.push_str(&tag);
    for (name, value) in attrs::get_attributes(node) {
        out.push_str(&format!(" {name}=\"{value}\""));
    }
    let classes = attrs::get_classes(node);
    if !classes.is_empty() {
        out.push_str(&format!(" class=\"{}\"", classes.join(" ")));
    }
    let styles = attrs::get_styles(node);
    if !styles.is_empty() {
        let declarations: Vec<String> = styles.iter().map(|(p, v)| format!("{p}: {v};")).collect();
        out.push_str(&format!(" style=\"{}\"", declarations.join(" ")));
    }
    out.push('>');
    out.push_str(&core::get_text(node));
    for child in core::get_children(node) {
        write_node(child, out);
    }
    out.push_str(&format!("</{tag}>"));
}

/// Concatenated text of a node and its descendants.
pub fn text_content(node: NodeIndex) -> String {
    let mut out = core::get_text(node);
    for child in core::get_children(node) {
        out.push_str(&text_content(child));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{document_root, reset_document, template_root};

    #[test]
    fn test_build_and_serialize() {
        reset_document();
        let node = element("div")
            .attr("id", "box")
            .attr("class", "a b")
            .attr("style", "color: red")
            .child(element("span").text("hi"))
            .mount(document_root());

        assert_eq!(
            outer_html(node),
            "<div id=\"box\" class=\"a b\" style=\"color: red;\"><span>hi</span></div>"
        );
        assert_eq!(text_content(node), "hi");
    }

    #[test]
    fn test_template_content_is_detached() {
        reset_document();
        let node = template(element("li").text("x")).attr("x-if", "open").build();

        assert_eq!(outer_html(node), "<template x-if=\"open\"></template>");
        let content = template_root(node).expect("content root");
        assert_eq!(outer_html(content), "<li>x</li>");
    }
}
