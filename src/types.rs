//! Core types for spark-directives.
//!
//! These types define the foundation that everything builds on.
//! Nodes are indices into the engine's parallel arrays, values are plain JSON data,
//! and every mount operation hands back a cleanup closure.

use std::fmt;

// =============================================================================
// Nodes
// =============================================================================

/// A node is an index into the engine's parallel arrays, not an object.
pub type NodeIndex = usize;

// =============================================================================
// Values and Scopes
// =============================================================================

/// Data flowing through scopes, expressions and binding sets.
pub type Value = serde_json::Value;

/// A flat set of named values (one iteration scope, one `data` root, ...).
pub type Scope = serde_json::Map<String, Value>;

/// Cleanup function returned by mount operations.
///
/// Call this to tear down whatever the operation set up.
pub type Cleanup = Box<dyn FnOnce()>;

/// JavaScript-flavoured truthiness used by conditionals and `show`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form of a value as it would appear in an attribute.
pub fn value_to_attribute_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Keys
// =============================================================================

/// Identity of one item in a keyed list.
///
/// Keys should be strings or integers. Anything else is still usable (it is keyed
/// by its canonical JSON text), but composite values are reported as a warning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
    /// Floats, booleans, null and composite values, keyed by canonical JSON.
    Other(String),
}

impl Key {
    /// Convert an evaluated key expression into a key.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Key::Int(i),
                None => Key::Other(n.to_string()),
            },
            Value::String(s) => Key::Str(s.clone()),
            other => Key::Other(other.to_string()),
        }
    }

    /// Whether the source value was an array or object.
    pub fn is_composite(value: &Value) -> bool {
        matches!(value, Value::Array(_) | Value::Object(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s}"),
            Key::Other(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}
