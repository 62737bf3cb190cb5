//! # spark-directives
//!
//! Declarative directive engine for reactive node trees.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! Nodes are indices into parallel arrays (ECS-style), not objects. Directives are
//! attributes (`x-for`, `x-if`, `x-transition`, `:class`, `@click`, ...) resolved by
//! an explicit [`DirectiveRegistry`] owned by the [`Runtime`]. All per-node
//! directive state lives in side tables keyed by node index.
//!
//! ```text
//! attributes → directives (priority order) → effects → mutate_dom batches
//!                                               │
//!          reconcile (for) / conditional (if) / show + transition / bindings
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Core types (NodeIndex, Value, Scope, Key, Cleanup)
//! - [`engine`] - Node registry, parallel arrays, tree operations, builder
//! - [`pipeline`] - Mutation batching and the tick scheduler
//! - [`scope`] - Reactive scopes and per-node scope stacks
//! - [`evaluator`] - Expression evaluation trait and the built-in evaluator
//! - [`directives`] - Directive parsing, registry, `data`/`text`/`init`/`on`/`show`,
//!   `model`/`modelable` and `id`
//! - [`bindings`] - Binding Applicator and the attribute binder
//! - [`reconcile`] - Keyed-List Reconciler (`for`)
//! - [`conditional`] - Conditional Renderer (`if`)
//! - [`transition`] - Transition state machine and nested hide ordering
//! - [`runtime`] - Lifecycle walker, evaluation entry points, mutation processing
//! - [`config`] / [`error`] / [`diagnostics`] - Ambient configuration, errors, warnings

pub mod bindings;
pub mod conditional;
pub mod config;
pub mod diagnostics;
pub mod directives;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod pipeline;
pub mod reconcile;
pub mod runtime;
pub mod scope;
pub mod transition;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use bindings::{apply_bindings, bind_attribute, get_binding, BindingSource};
pub use config::{EngineConfig, TransitionDefaults};
pub use diagnostics::{take_warnings, Warning};
pub use directives::{Directive, DirectiveContext, DirectiveRegistry};
pub use error::{DirectiveError, Result};
pub use evaluator::{Evaluator, SimpleEvaluator};
pub use reconcile::{diff_keys, Anchor, KeyDiff};
pub use runtime::{destroy_tree, reset_all, Runtime, RuntimeBuilder};
pub use scope::{ReactiveScope, ScopeChain};
pub use transition::{
    perform_transition, toggle_with_transitions, transition_in, transition_out, HideOutcome,
    TransitionHandle, TransitionStages, TransitionState,
};

/// Everything a host typically needs.
pub mod prelude {
    pub use crate::engine::{document_root, element, outer_html, template, text_content};
    pub use crate::pipeline::{mutate_dom, run_until_idle};
    pub use crate::{
        apply_bindings, take_warnings, BindingSource, EngineConfig, Key, NodeIndex, Runtime,
        Value, Warning,
    };
}
