//! Node Engine - Registry, parallel arrays and tree operations.
//!
//! The engine manages the core data structures:
//! - Registry: Index allocation, destroy callbacks
//! - Arrays: Parallel columns for node state (tag, parent, children, attributes, ...)
//! - Tree: Insert/remove/clone and connectivity
//! - Style: Classes, inline styles, computed style
//! - Builder: Declarative subtree construction and serialization
//!
//! # Architecture
//!
//! Nodes are NOT objects. They are indices into parallel arrays:
//!
//! ```text
//! Index 0: #document (parent=None, children=[1])
//! Index 1: ul        (parent=0,    children=[2, 4])
//! Index 2: template  (parent=1,    content=3, attrs=[x-for, :key])
//! Index 4: li        (parent=1,    classes=[done])
//! ```
//!
//! Directive state (scopes, transitions, list lookups) lives in side tables owned
//! by the component that needs it, keyed by the same index.

mod registry;
mod tree;
mod style;
mod builder;
pub mod arrays;

pub use registry::*;
pub use tree::*;
pub use style::*;
pub use builder::*;

pub use arrays::attrs::{
    add_class, get_attribute, get_attributes, get_classes, get_style, get_styles, has_class,
    remove_attribute, remove_class, remove_style, set_attribute, set_style,
};
pub use arrays::core::{get_tag, get_text, set_text};

/// Reset the node arena, the document root and class rules (for testing).
pub fn reset_document() {
    reset_registry();
    tree::reset_document_root();
    style::reset_class_rules();
}
