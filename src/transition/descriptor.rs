//! Transition descriptors - What a node looks like at each phase.
//!
//! A descriptor holds `start`, `during` and `end` values for both directions.
//! It is created on the first `transition` directive and keeps the mode it was
//! created with: helper descriptors hold style maps, class-string descriptors
//! hold class lists.
//!
//! ```text
//! x-transition.scale.80.duration.300ms        helper (styles)
//! x-transition:enter="fade" ...               class strings
//! ```

use serde_json::json;

use crate::config::TransitionDefaults;
use crate::engine::{set_classes, set_styles, Undo};
use crate::types::{NodeIndex, Value};

/// How phase values are applied to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    Styles,
    Classes,
}

impl TransitionMode {
    /// The "nothing" value for this mode.
    pub fn empty_value(self) -> Value {
        match self {
            Self::Styles => Value::Object(Default::default()),
            Self::Classes => Value::String(String::new()),
        }
    }

    /// Apply a phase value, returning its undo.
    pub fn apply(self, node: NodeIndex, value: &Value) -> Undo {
        match self {
            Self::Styles => set_styles(node, value),
            Self::Classes => set_classes(node, value),
        }
    }
}

/// Whether a phase value would change nothing.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// `start` / `during` / `end` of one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Phases {
    pub start: Value,
    pub during: Value,
    pub end: Value,
}

impl Phases {
    fn empty(mode: TransitionMode) -> Self {
        Self { start: mode.empty_value(), during: mode.empty_value(), end: mode.empty_value() }
    }

    pub fn is_empty(&self) -> bool {
        is_empty_value(&self.start) && is_empty_value(&self.during) && is_empty_value(&self.end)
    }
}

/// Per-node transition definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDescriptor {
    pub mode: TransitionMode,
    pub enter: Phases,
    pub leave: Phases,
}

impl TransitionDescriptor {
    pub fn new(mode: TransitionMode) -> Self {
        Self { mode, enter: Phases::empty(mode), leave: Phases::empty(mode) }
    }
}

/// Class-string stages (`x-transition:<stage>="classes"`).
pub const CLASS_STAGES: [&str; 6] = ["enter", "enter-start", "enter-end", "leave", "leave-start", "leave-end"];

/// Store a class string under `stage`. Returns false for an unknown stage.
pub fn apply_class_stage(descriptor: &mut TransitionDescriptor, stage: &str, classes: &str) -> bool {
    let value = Value::String(classes.to_string());
    let slot = match stage {
        "enter" => &mut descriptor.enter.during,
        "enter-start" => &mut descriptor.enter.start,
        "enter-end" => &mut descriptor.enter.end,
        "leave" => &mut descriptor.leave.during,
        "leave-start" => &mut descriptor.leave.start,
        "leave-end" => &mut descriptor.leave.end,
        _ => return false,
    };
    *slot = value;
    true
}

// =============================================================================
// Helper form
// =============================================================================

/// Look up the value following `key` in a modifier list.
///
/// - `scale` must be followed by a number
/// - `duration` / `delay` accept `300ms` as well as `300`
/// - `origin` chains a second direction (`origin.top.right` → `"top right"`)
pub fn modifier_value(modifiers: &[String], key: &str, fallback: &str) -> String {
    let Some(position) = modifiers.iter().position(|m| m == key) else {
        return fallback.to_string();
    };
    let Some(raw) = modifiers.get(position + 1).filter(|raw| !raw.is_empty()) else {
        return fallback.to_string();
    };

    match key {
        "scale" if raw.parse::<f64>().is_err() => fallback.to_string(),
        "duration" | "delay" => match raw.find("ms") {
            Some(end) if end > 0 && raw[..end].chars().all(|c| c.is_ascii_digit()) => raw[..end].to_string(),
            _ => raw.clone(),
        },
        "origin" => match modifiers.get(position + 2) {
            Some(second) if ["top", "right", "left", "center", "bottom"].contains(&second.as_str()) => {
                format!("{raw} {second}")
            }
            _ => raw.clone(),
        },
        _ => raw.clone(),
    }
}

fn number_or(text: &str, fallback: f64) -> f64 {
    text.parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(fallback)
}

/// Fill a style descriptor from helper modifiers (`in`, `out`, `opacity`,
/// `scale`, `duration`, `delay`, `origin`).
///
/// `stage` is the directive value (`enter` / `leave` limit the direction).
pub fn apply_helper(
    descriptor: &mut TransitionDescriptor,
    modifiers: &[String],
    stage: &str,
    defaults: &TransitionDefaults,
) {
    let has = |name: &str| modifiers.iter().any(|m| m == name);
    let unspecified = !has("in") && !has("out") && stage.is_empty();
    let transitioning_in = unspecified || has("in") || stage == "enter";
    let transitioning_out = unspecified || has("out") || stage == "leave";

    // `.in.<mods>.out.<mods>`: keep the modifiers of the direction that came first.
    let scoped: Vec<String> = if has("in") && !unspecified {
        let out = modifiers.iter().position(|m| m == "out").unwrap_or(modifiers.len());
        modifiers[..out].to_vec()
    } else if has("out") && !unspecified {
        let out = modifiers.iter().position(|m| m == "out").unwrap_or(0);
        modifiers[out + 1..].to_vec()
    } else {
        modifiers.to_vec()
    };
    let has_scoped = |name: &str| scoped.iter().any(|m| m == name);

    let wants_all = !has_scoped("opacity") && !has_scoped("scale");
    let opacity = if wants_all || has_scoped("opacity") { 0 } else { 1 };
    let scale = if wants_all || has_scoped("scale") {
        let fallback = defaults.scale_percent.to_string();
        number_or(&modifier_value(&scoped, "scale", &fallback), defaults.scale_percent as f64) / 100.0
    } else {
        1.0
    };
    let seconds = |key: &str, fallback_ms: u64| {
        let text = modifier_value(&scoped, key, &fallback_ms.to_string());
        number_or(&text, fallback_ms as f64) / 1000.0
    };
    let delay = seconds("delay", defaults.delay_ms);
    let duration_in = seconds("duration", defaults.duration_in_ms);
    let duration_out = seconds("duration", defaults.duration_out_ms);
    let origin = modifier_value(&scoped, "origin", &defaults.origin);

    let during = |duration: f64| {
        json!({
            "transformOrigin": origin,
            "transitionDelay": format!("{delay}s"),
            "transitionProperty": "opacity, transform",
            "transitionDuration": format!("{duration}s"),
            "transitionTimingFunction": defaults.easing,
        })
    };
    let visible = json!({ "opacity": 1, "transform": "scale(1)" });
    let hidden = json!({ "opacity": opacity, "transform": format!("scale({scale})") });

    if transitioning_in {
        descriptor.enter = Phases { start: hidden.clone(), during: during(duration_in), end: visible.clone() };
    }
    if transitioning_out {
        descriptor.leave = Phases { start: visible, during: during(duration_out), end: hidden };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mods(list: &[&str]) -> Vec<String> {
        list.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_modifier_value() {
        let list = mods(&["scale", "80", "duration", "300ms", "origin", "top", "right"]);
        assert_eq!(modifier_value(&list, "scale", "95"), "80");
        assert_eq!(modifier_value(&list, "duration", "150"), "300");
        assert_eq!(modifier_value(&list, "origin", "center"), "top right");
        assert_eq!(modifier_value(&list, "delay", "0"), "0");

        assert_eq!(modifier_value(&mods(&["scale", "opacity"]), "scale", "95"), "95");
        assert_eq!(modifier_value(&mods(&["scale"]), "scale", "95"), "95");
        assert_eq!(modifier_value(&mods(&["duration", "500"]), "duration", "150"), "500");
    }

    #[test]
    fn test_helper_defaults() {
        let mut descriptor = TransitionDescriptor::new(TransitionMode::Styles);
        apply_helper(&mut descriptor, &[], "", &TransitionDefaults::default());

        assert_eq!(descriptor.enter.start, json!({"opacity": 0, "transform": "scale(0.95)"}));
        assert_eq!(descriptor.enter.end, json!({"opacity": 1, "transform": "scale(1)"}));
        assert_eq!(descriptor.enter.during["transitionDuration"], json!("0.15s"));
        assert_eq!(descriptor.leave.during["transitionDuration"], json!("0.075s"));
        assert_eq!(descriptor.leave.end, json!({"opacity": 0, "transform": "scale(0.95)"}));
        assert_eq!(descriptor.enter.during["transformOrigin"], json!("center"));
    }

    #[test]
    fn test_helper_opacity_only_enter() {
        let mut descriptor = TransitionDescriptor::new(TransitionMode::Styles);
        apply_helper(&mut descriptor, &mods(&["opacity"]), "enter", &TransitionDefaults::default());

        assert_eq!(descriptor.enter.start, json!({"opacity": 0, "transform": "scale(1)"}));
        assert!(descriptor.leave.is_empty());
    }

    #[test]
    fn test_helper_in_modifiers_scoped() {
        let mut descriptor = TransitionDescriptor::new(TransitionMode::Styles);
        apply_helper(
            &mut descriptor,
            &mods(&["in", "duration", "300ms"]),
            "",
            &TransitionDefaults::default(),
        );
        assert_eq!(descriptor.enter.during["transitionDuration"], json!("0.3s"));
        assert!(descriptor.leave.is_empty());

        let mut both = TransitionDescriptor::new(TransitionMode::Styles);
        apply_helper(
            &mut both,
            &mods(&["out", "scale", "90", "duration", "50ms"]),
            "",
            &TransitionDefaults::default(),
        );
        assert!(both.enter.is_empty());
        assert_eq!(both.leave.end, json!({"opacity": 1, "transform": "scale(0.9)"}));
        assert_eq!(both.leave.during["transitionDuration"], json!("0.05s"));
    }

    #[test]
    fn test_class_stages() {
        let mut descriptor = TransitionDescriptor::new(TransitionMode::Classes);
        assert!(descriptor.enter.is_empty());
        assert!(apply_class_stage(&mut descriptor, "enter-start", "opacity-0"));
        assert!(!apply_class_stage(&mut descriptor, "sideways", "x"));

        assert_eq!(descriptor.enter.start, json!("opacity-0"));
        assert!(!descriptor.enter.is_empty());
        assert!(descriptor.leave.is_empty());
    }
}
