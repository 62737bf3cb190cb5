//! Directives - Parsing, registry and handler context.
//!
//! A directive is an attribute such as `x-on:click.outside="open = false"`:
//!
//! ```text
//! x-    on     :click   .outside     = "open = false"
//! prefix kind   value    modifiers      expression
//! ```
//!
//! `:name` and `@name` are shorthands for `x-bind:name` and `x-on:name`.
//!
//! Handlers live in an explicit [`DirectiveRegistry`] owned by the runtime. Each
//! handler receives the node, the parsed [`Directive`] and a [`DirectiveContext`]
//! that collects the cleanups the handler registers. Directives on one node run in
//! a fixed priority order (`data`, `id`, `bind`, `init`, `for`, `model`, `modelable`,
//! `transition`, `show`, `if`, then everything else in declaration order).

pub mod data;
pub mod id;
pub mod model;
pub mod on;
pub mod show;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use spark_signals::{effect, with_context, AnyReaction};

use crate::error::Result;
use crate::runtime::Runtime;
use crate::types::{Cleanup, NodeIndex, Scope, Value};

pub use on::{dispatch_event, listener_count, Event, EventModifiers};

// =============================================================================
// Directive
// =============================================================================

/// One parsed directive attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// `on` in `x-on:click`.
    pub kind: String,
    /// `click` in `x-on:click`. Empty when absent.
    pub value: String,
    /// `["outside"]` in `x-on:click.outside`.
    pub modifiers: Vec<String>,
    pub expression: String,
    /// The attribute name as written (`@click.outside`).
    pub original: String,
}

/// Directive kinds that run before everything else, in this order.
const PRIORITY: [&str; 10] =
    ["data", "id", "bind", "init", "for", "model", "modelable", "transition", "show", "if"];

impl Directive {
    /// Parse an attribute. Returns `None` for plain (non-directive) attributes.
    pub fn parse(name: &str, expression: &str, prefix: &str) -> Option<Self> {
        let expanded = expand_shorthand(name, prefix);
        let rest = expanded.strip_prefix(prefix)?;

        let kind_end = rest.find([':', '.']).unwrap_or(rest.len());
        let kind = &rest[..kind_end];
        if kind.is_empty() {
            return None;
        }

        let tail = &rest[kind_end..];
        let (value, modifiers) = match tail.strip_prefix(':') {
            Some(after) => match after.split_once('.') {
                Some((value, modifiers)) => (value, modifiers),
                None => (after, ""),
            },
            None => ("", tail.strip_prefix('.').unwrap_or("")),
        };

        Some(Self {
            kind: kind.to_string(),
            value: value.to_string(),
            modifiers: modifiers
                .split('.')
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),
            expression: expression.to_string(),
            original: name.to_string(),
        })
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    /// The modifier right after `key` (`.duration.300ms` → `300ms`).
    pub fn modifier_after(&self, key: &str) -> Option<&str> {
        let position = self.modifiers.iter().position(|m| m == key)?;
        self.modifiers.get(position + 1).map(String::as_str)
    }

    fn priority(&self) -> usize {
        PRIORITY.iter().position(|k| *k == self.kind).unwrap_or(PRIORITY.len())
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// `:name` → `x-bind:name`, `@name` → `x-on:name`.
pub fn expand_shorthand(name: &str, prefix: &str) -> String {
    if let Some(rest) = name.strip_prefix(':') {
        format!("{prefix}bind:{rest}")
    } else if let Some(rest) = name.strip_prefix('@') {
        format!("{prefix}on:{rest}")
    } else {
        name.to_string()
    }
}

/// Parse every directive among `attributes`, in execution order.
pub fn directives_from(attributes: &[(String, String)], prefix: &str) -> Vec<Directive> {
    let mut directives: Vec<Directive> = attributes
        .iter()
        .filter_map(|(name, expression)| Directive::parse(name, expression, prefix))
        .collect();
    directives.sort_by_key(Directive::priority);
    directives
}

/// The attributes that are not directives.
pub fn attributes_only(attributes: &[(String, String)], prefix: &str) -> Vec<(String, String)> {
    attributes
        .iter()
        .filter(|(name, expression)| Directive::parse(name, expression, prefix).is_none())
        .cloned()
        .collect()
}

// =============================================================================
// Registry
// =============================================================================

/// A directive implementation.
pub type DirectiveHandler = Rc<dyn Fn(NodeIndex, &Directive, &DirectiveContext) -> Result<()>>;

/// Maps directive kinds to handlers. Constructed once and owned by the runtime.
#[derive(Clone, Default)]
pub struct DirectiveRegistry {
    handlers: HashMap<String, DirectiveHandler>,
}

impl DirectiveRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in directive.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("data", data::data_directive);
        registry.register("init", data::init_directive);
        registry.register("id", id::id_directive);
        registry.register("text", data::text_directive);
        registry.register("bind", crate::bindings::bind_directive);
        registry.register("on", on::on_directive);
        registry.register("model", model::model_directive);
        registry.register("modelable", model::modelable_directive);
        registry.register("show", show::show_directive);
        registry.register("for", crate::reconcile::for_directive);
        registry.register("if", crate::conditional::if_directive);
        registry.register("transition", crate::transition::transition_directive);
        registry
    }

    /// Register (or replace) the handler for `kind`.
    pub fn register(
        &mut self,
        kind: &str,
        handler: impl Fn(NodeIndex, &Directive, &DirectiveContext) -> Result<()> + 'static,
    ) {
        self.handlers.insert(kind.to_string(), Rc::new(handler));
    }

    pub fn get(&self, kind: &str) -> Option<DirectiveHandler> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveRegistry").field("kinds", &self.kinds()).finish()
    }
}

// =============================================================================
// Handler Context
// =============================================================================

/// Getter returned by [`DirectiveContext::evaluate_later`].
///
/// Each call evaluates the expression against the node's current scope chain,
/// layered with the optional overlay. Failures are reported as warnings and read
/// as `null`.
pub type Getter = Rc<dyn Fn(Option<Scope>) -> Value>;

/// What a directive handler can do besides touching its node.
pub struct DirectiveContext {
    runtime: Runtime,
    node: NodeIndex,
    cleanups: RefCell<Vec<Cleanup>>,
}

impl DirectiveContext {
    pub(crate) fn new(runtime: Runtime, node: NodeIndex) -> Self {
        Self { runtime, node, cleanups: RefCell::new(Vec::new()) }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn node(&self) -> NodeIndex {
        self.node
    }

    /// Run `f` now and again whenever a signal it read changes.
    ///
    /// The effect is stopped when the directive is torn down, and only then: it is
    /// created outside any running effect, so re-runs of an enclosing `for` or
    /// `bind` never dispose it.
    pub fn effect(&self, f: impl Fn() + 'static) {
        let stop = detached(|| effect(f));
        self.cleanup(stop);
    }

    /// Register teardown work for when the directive is torn down.
    pub fn cleanup(&self, f: impl FnOnce() + 'static) {
        self.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Evaluate `expression` once, now.
    pub fn evaluate(&self, expression: &str) -> Result<Value> {
        self.runtime.evaluate(self.node, expression, None)
    }

    /// A getter that evaluates `expression` each time it is called.
    pub fn evaluate_later(&self, expression: &str) -> Getter {
        self.runtime.evaluate_later(self.node, expression)
    }

    pub(crate) fn into_cleanups(self) -> Vec<Cleanup> {
        self.cleanups.into_inner()
    }
}

// =============================================================================
// Ownership
// =============================================================================

/// Run `f` with no active reaction or effect.
///
/// Signals read inside `f` are not tracked by the caller, and effects created
/// inside `f` have no parent. Used wherever a running effect builds a subtree
/// whose lifetime is managed by directive cleanups instead.
pub fn detached<T>(f: impl FnOnce() -> T) -> T {
    type Active = Option<Weak<dyn AnyReaction>>;

    struct Restore {
        reaction: Active,
        effect: Active,
    }

    impl Drop for Restore {
        fn drop(&mut self) {
            let (reaction, effect) = (self.reaction.take(), self.effect.take());
            with_context(|ctx| {
                ctx.set_active_reaction(reaction);
                ctx.set_active_effect(effect);
            });
        }
    }

    let (reaction, effect) =
        with_context(|ctx| (ctx.set_active_reaction(None), ctx.set_active_effect(None)));
    let _restore = Restore { reaction, effect };
    f()
}

/// Run every cleanup, last registered first.
pub(crate) fn run_cleanups(cleanups: Vec<Cleanup>) {
    for cleanup in cleanups.into_iter().rev() {
        cleanup();
    }
}
