//! Runtime - Directive resolution and the node lifecycle walker.
//!
//! A [`Runtime`] owns the directive registry, the expression evaluator, the
//! configuration and the named binding providers. It is cheap to clone (one `Rc`)
//! and every directive handler receives it through its context.
//!
//! # Lifecycle
//!
//! ```text
//! init_tree(root)     walk root + children, run each node's directives in
//!                     priority order, keep their cleanups per node
//! destroy_tree(root)  run those cleanups (last registered first), root first
//! process_mutations   init subtrees added / destroy subtrees removed outside
//!                     of mutate_dom
//! ```
//!
//! # Example
//!
//! ```ignore
//! use spark_directives::prelude::*;
//!
//! let runtime = Runtime::new();
//! let list = element("ul")
//!     .attr("x-data", r#"{"todos": [{"id": 1, "title": "write docs"}]}"#)
//!     .child(template(element("li").attr("x-text", "todo.title"))
//!         .attr("x-for", "todo in todos")
//!         .attr(":key", "todo.id"))
//!     .mount(document_root());
//! runtime.init_tree(list);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::bindings::{self, BindingSource};
use crate::config::EngineConfig;
use crate::diagnostics::{reset_diagnostics, warn, Warning};
use crate::directives::{
    directives_from, run_cleanups, Directive, DirectiveContext, DirectiveRegistry, Getter,
};
use crate::engine::{
    children, descendants, document_root, get_attributes, is_allocated, is_connected, on_destroy,
    parent, reset_document,
};
use crate::error::Result;
use crate::evaluator::{Evaluator, SimpleEvaluator};
use crate::pipeline::{take_observed_mutations, Mutation};
use crate::scope::scope_chain;
use crate::types::{Cleanup, NodeIndex, Scope, Value};

// =============================================================================
// Per-node lifecycle tables
// =============================================================================

thread_local! {
    static INITIALIZED: RefCell<HashSet<NodeIndex>> = RefCell::new(HashSet::new());
    static NODE_CLEANUPS: RefCell<HashMap<NodeIndex, Vec<Cleanup>>> = RefCell::new(HashMap::new());
}

fn mark_initialized(node: NodeIndex) -> bool {
    let fresh = INITIALIZED.with(|set| set.borrow_mut().insert(node));
    if fresh {
        on_destroy(node, move || run_node_cleanups(node));
    }
    fresh
}

fn run_node_cleanups(node: NodeIndex) {
    INITIALIZED.with(|set| set.borrow_mut().remove(&node));
    let cleanups = NODE_CLEANUPS.with(|c| c.borrow_mut().remove(&node));
    if let Some(cleanups) = cleanups {
        run_cleanups(cleanups);
    }
}

/// Whether `init_tree` has run the node's directives.
pub fn is_initialized(node: NodeIndex) -> bool {
    INITIALIZED.with(|set| set.borrow().contains(&node))
}

/// Run the directive cleanups of `root` and every descendant.
pub fn destroy_tree(root: NodeIndex) {
    for node in descendants(root) {
        if is_allocated(node) {
            run_node_cleanups(node);
        }
    }
}

/// Reset every thread-local table of the crate (for testing).
pub fn reset_all() {
    reset_document();
    crate::pipeline::ticks::reset_scheduler();
    crate::pipeline::batch::reset_batch();
    reset_diagnostics();
    crate::scope::reset_scopes();
    bindings::reset_bindings();
    crate::directives::on::reset_listeners();
    crate::directives::model::reset_models();
    crate::directives::id::reset_ids();
    crate::transition::reset_transitions();
    crate::reconcile::reset_lists();
    crate::conditional::reset_conditionals();
    INITIALIZED.with(|set| set.borrow_mut().clear());
    NODE_CLEANUPS.with(|c| c.borrow_mut().clear());
}

// =============================================================================
// Runtime
// =============================================================================

struct RuntimeInner {
    registry: DirectiveRegistry,
    evaluator: Box<dyn Evaluator>,
    config: EngineConfig,
    providers: RefCell<HashMap<String, BindingSource>>,
}

/// Resolves and runs directives. Clones share the same registry and providers.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime with the built-in directives, [`SimpleEvaluator`] and default config.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &DirectiveRegistry {
        &self.inner.registry
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Evaluate `expression` against the node's scope chain plus `overlay`.
    pub fn evaluate(&self, node: NodeIndex, expression: &str, overlay: Option<Scope>) -> Result<Value> {
        self.inner.evaluator.evaluate(expression, &scope_chain(node, overlay))
    }

    /// Run a statement against the node's scope chain plus `overlay`.
    pub fn execute(&self, node: NodeIndex, expression: &str, overlay: Option<Scope>) -> Result<Value> {
        self.inner.evaluator.execute(expression, &scope_chain(node, overlay))
    }

    /// A getter re-evaluating `expression` on each call.
    ///
    /// Errors are reported as [`Warning::Evaluation`] and read as `null`.
    pub fn evaluate_later(&self, node: NodeIndex, expression: &str) -> Getter {
        let runtime = self.clone();
        let expression = expression.to_string();
        Rc::new(move |overlay| match runtime.evaluate(node, &expression, overlay) {
            Ok(value) => value,
            Err(err) => {
                warn(Warning::Evaluation { node, expression: expression.clone(), message: err.to_string() });
                Value::Null
            }
        })
    }

    // -------------------------------------------------------------------------
    // Directives
    // -------------------------------------------------------------------------

    /// Run one directive on `node`, returning the cleanups it registered.
    ///
    /// A failing handler is reported as [`Warning::DirectiveFailed`]; whatever it
    /// registered before failing is still returned.
    pub fn run_directive(&self, node: NodeIndex, directive: &Directive) -> Vec<Cleanup> {
        let Some(handler) = self.inner.registry.get(&directive.kind) else {
            tracing::trace!(target: "spark_directives", node, directive = %directive, "no handler");
            return Vec::new();
        };

        let cx = DirectiveContext::new(self.clone(), node);
        if let Err(err) = handler(node, directive, &cx) {
            warn(Warning::DirectiveFailed {
                node,
                directive: directive.original.clone(),
                message: err.to_string(),
            });
        }
        cx.into_cleanups()
    }

    /// Initialize `root` and its subtree. Already initialized nodes are skipped.
    pub fn init_tree(&self, root: NodeIndex) {
        let mut count = 0;
        self.init_node(root, &mut count);
        tracing::debug!(target: "spark_directives", root, nodes = count, "tree initialized");
    }

    fn init_node(&self, node: NodeIndex, count: &mut usize) {
        if !is_allocated(node) {
            return;
        }

        if mark_initialized(node) {
            *count += 1;
            let directives = directives_from(&get_attributes(node), &self.inner.config.prefix);
            let mut cleanups = Vec::new();
            for directive in &directives {
                cleanups.extend(self.run_directive(node, directive));
            }
            if !cleanups.is_empty() {
                NODE_CLEANUPS.with(|c| c.borrow_mut().entry(node).or_default().extend(cleanups));
            }
        }

        for child in children(node) {
            // Directives above may have moved or released it.
            if parent(child) == Some(node) {
                self.init_node(child, count);
            }
        }
    }

    /// Initialize the whole document.
    pub fn start(&self) {
        self.init_tree(document_root());
    }

    /// Run the directive cleanups of `root` and every descendant.
    pub fn destroy_tree(&self, root: NodeIndex) {
        destroy_tree(root);
    }

    // -------------------------------------------------------------------------
    // Bindings
    // -------------------------------------------------------------------------

    /// Apply a binding set to `node`. See [`bindings::apply_bindings`].
    pub fn apply_bindings(&self, node: NodeIndex, source: &BindingSource) -> Cleanup {
        bindings::apply_bindings(self, node, source)
    }

    /// Register a named binding provider for `x-bind="name"`.
    pub fn bind(&self, name: &str, source: BindingSource) {
        self.inner.providers.borrow_mut().insert(name.to_string(), source);
    }

    pub fn binding_provider(&self, name: &str) -> Option<BindingSource> {
        self.inner.providers.borrow().get(name).cloned()
    }

    // -------------------------------------------------------------------------
    // Mutation observation
    // -------------------------------------------------------------------------

    /// Handle tree changes made outside of `mutate_dom`.
    ///
    /// Removed subtrees that are no longer connected are destroyed, then added
    /// subtrees that are connected are initialized. A node moved within the
    /// document is neither. Returns the number of subtrees handled.
    pub fn process_mutations(&self) -> usize {
        let mutations = take_observed_mutations();
        let mut removed: Vec<NodeIndex> = Vec::new();
        let mut added: Vec<NodeIndex> = Vec::new();
        for mutation in mutations {
            match mutation {
                Mutation::Removed { node, .. } if !removed.contains(&node) => removed.push(node),
                Mutation::Added { node, .. } if !added.contains(&node) => added.push(node),
                _ => {}
            }
        }

        let mut handled = 0;
        for node in removed {
            if is_allocated(node) && !is_connected(node) {
                destroy_tree(node);
                handled += 1;
            }
        }
        for node in added {
            if is_connected(node) && !is_initialized(node) {
                self.init_tree(node);
                handled += 1;
            }
        }
        if handled > 0 {
            tracing::debug!(target: "spark_directives", handled, "processed mutations");
        }
        handled
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures a [`Runtime`].
pub struct RuntimeBuilder {
    registry: DirectiveRegistry,
    evaluator: Box<dyn Evaluator>,
    config: EngineConfig,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self {
            registry: DirectiveRegistry::with_builtins(),
            evaluator: Box::new(SimpleEvaluator),
            config: EngineConfig::default(),
        }
    }
}

impl RuntimeBuilder {
    /// Replace the expression evaluator.
    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register (or replace) a directive handler.
    pub fn directive(
        mut self,
        kind: &str,
        handler: impl Fn(NodeIndex, &Directive, &DirectiveContext) -> Result<()> + 'static,
    ) -> Self {
        self.registry.register(kind, handler);
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            inner: Rc::new(RuntimeInner {
                registry: self.registry,
                evaluator: self.evaluator,
                config: self.config,
                providers: RefCell::new(HashMap::new()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::take_warnings;
    use crate::engine::{append_child, create_element, element, get_text, remove};
    use crate::error::DirectiveError;
    use std::cell::Cell;

    #[test]
    fn test_directives_run_in_priority_order() {
        reset_all();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (order.clone(), order.clone());
        let runtime = Runtime::builder()
            .directive("late", move |_, _, _| {
                a.borrow_mut().push("late");
                Ok(())
            })
            .directive("data", move |_, _, _| {
                b.borrow_mut().push("data");
                Ok(())
            })
            .build();

        let node = element("div").attr("x-late", "").attr("x-data", "").mount(document_root());
        runtime.init_tree(node);
        assert_eq!(*order.borrow(), vec!["data", "late"]);
    }

    #[test]
    fn test_failing_directive_does_not_stop_siblings() {
        reset_all();
        let runtime = Runtime::builder()
            .directive("boom", |_, _, _| Err(DirectiveError::Config("nope".into())))
            .build();
        let node = element("div")
            .attr("x-boom", "")
            .attr("x-data", r#"{"msg": "still here"}"#)
            .attr("x-text", "msg")
            .mount(document_root());
        runtime.init_tree(node);

        assert_eq!(get_text(node), "still here");
        assert!(matches!(
            take_warnings().as_slice(),
            [Warning::DirectiveFailed { directive, .. }] if directive == "x-boom"
        ));
    }

    #[test]
    fn test_init_is_idempotent_and_destroy_runs_cleanups() {
        reset_all();
        let cleaned = Rc::new(Cell::new(0));
        let counter = cleaned.clone();
        let runs = Rc::new(Cell::new(0));
        let run_counter = runs.clone();
        let runtime = Runtime::builder()
            .directive("counted", move |_, _, cx| {
                run_counter.set(run_counter.get() + 1);
                let counter = counter.clone();
                cx.cleanup(move || counter.set(counter.get() + 1));
                Ok(())
            })
            .build();

        let root = element("div").child(element("span").attr("x-counted", "")).mount(document_root());
        runtime.init_tree(root);
        runtime.init_tree(root);
        assert_eq!(runs.get(), 1);

        runtime.destroy_tree(root);
        assert_eq!(cleaned.get(), 1);
        runtime.destroy_tree(root);
        assert_eq!(cleaned.get(), 1);
    }

    #[test]
    fn test_evaluate_later_reports_and_reads_null() {
        reset_all();
        let runtime = Runtime::new();
        let node = create_element("div");
        append_child(document_root(), node);

        let getter = runtime.evaluate_later(node, "missing.field");
        assert_eq!(getter(None), Value::Null);
        assert!(matches!(take_warnings().as_slice(), [Warning::Evaluation { .. }]));
    }

    #[test]
    fn test_process_mutations() {
        reset_all();
        let runtime = Runtime::new();
        let root = element("div").attr("x-data", r#"{"name": "observed"}"#).mount(document_root());
        runtime.init_tree(root);
        take_observed_mutations();

        let span = element("span").attr("x-text", "name").build();
        append_child(root, span);
        assert_eq!(runtime.process_mutations(), 1);
        assert_eq!(get_text(span), "observed");
        assert!(is_initialized(span));

        remove(span);
        assert_eq!(runtime.process_mutations(), 1);
        assert!(!is_initialized(span));
    }

    #[test]
    fn test_binding_providers() {
        reset_all();
        let runtime = Runtime::new();
        runtime.bind("button", BindingSource::from_pairs([("role", serde_json::json!("button"))]));

        let node = element("div").attr("x-bind", "button").mount(document_root());
        runtime.init_tree(node);
        assert_eq!(crate::engine::get_attribute(node, "role").as_deref(), Some("button"));
    }
}
