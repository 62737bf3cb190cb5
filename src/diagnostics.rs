//! Diagnostic channel - non-fatal usage warnings.
//!
//! Misplaced directives, duplicate or composite list keys, failed evaluations and
//! similar conditions never abort a pass. They are logged through `tracing` and
//! collected in a thread-local sink so hosts (and tests) can inspect them.
//!
//! # Example
//!
//! ```ignore
//! use spark_directives::diagnostics::{take_warnings, Warning};
//!
//! runtime.init_tree(root);
//! for warning in take_warnings() {
//!     eprintln!("{warning}");
//! }
//! ```

use std::cell::RefCell;

use thiserror::Error;

use crate::types::NodeIndex;

/// A non-fatal condition reported while resolving directives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Warning {
    #[error("{directive} can only be used on a <{expected}> node (node {node})")]
    MisplacedDirective { directive: String, expected: &'static str, node: NodeIndex },
    #[error("Duplicate key on list rendered after node {anchor}: {key}")]
    DuplicateKey { anchor: NodeIndex, key: String },
    #[error("List key is undefined or invalid after node {anchor}: {key}")]
    InvalidMoveKey { anchor: NodeIndex, key: String },
    #[error("List key cannot be an object, it must be a string or an integer (node {anchor}): {key}")]
    CompositeKey { anchor: NodeIndex, key: String },
    #[error("Invalid for expression on node {node}: `{expression}`")]
    InvalidForExpression { node: NodeIndex, expression: String },
    #[error("Error evaluating `{expression}` on node {node}: {message}")]
    Evaluation { node: NodeIndex, expression: String, message: String },
    #[error("Directive `{directive}` failed on node {node}: {message}")]
    DirectiveFailed { node: NodeIndex, directive: String, message: String },
    #[error("Transition class string on node {node} needs a stage (enter, leave-start, ...)")]
    MissingTransitionStage { node: NodeIndex },
    #[error("Unknown transition stage `{stage}` on node {node}")]
    UnknownTransitionStage { node: NodeIndex, stage: String },
    #[error("`{name}` is neither a registered binding nor an object (node {node})")]
    UnknownBinding { node: NodeIndex, name: String },
}

thread_local! {
    static WARNINGS: RefCell<Vec<Warning>> = const { RefCell::new(Vec::new()) };
}

/// Report a warning to the diagnostic channel.
pub fn warn(warning: Warning) {
    tracing::warn!(target: "spark_directives", "{}", warning);
    WARNINGS.with(|sink| sink.borrow_mut().push(warning));
}

/// Drain every warning reported on this thread so far.
pub fn take_warnings() -> Vec<Warning> {
    WARNINGS.with(|sink| std::mem::take(&mut *sink.borrow_mut()))
}

/// Number of warnings waiting in the sink.
pub fn warning_count() -> usize {
    WARNINGS.with(|sink| sink.borrow().len())
}

/// Clear the sink (for testing).
pub fn reset_diagnostics() {
    WARNINGS.with(|sink| sink.borrow_mut().clear());
}
