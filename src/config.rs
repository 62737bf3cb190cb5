//! Engine configuration.
//!
//! All fields have defaults, so a host only spells out what it wants to change:
//!
//! ```ignore
//! let config = EngineConfig::from_json(r#"{ "transition": { "duration_in_ms": 300 } }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DirectiveError, Result};

/// Runtime-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attribute prefix that marks a directive (`x-` in `x-for`).
    pub prefix: String,
    /// Key expression used by lists without a `:key` binding.
    pub default_key_expression: String,
    /// Defaults for the `transition` helper form.
    pub transition: TransitionDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix: "x-".to_string(),
            default_key_expression: "index".to_string(),
            transition: TransitionDefaults::default(),
        }
    }
}

/// Values used by `transition` when its modifiers don't say otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionDefaults {
    pub duration_in_ms: u64,
    pub duration_out_ms: u64,
    pub delay_ms: u64,
    /// Start/end scale in percent.
    pub scale_percent: u32,
    pub origin: String,
    pub easing: String,
}

impl Default for TransitionDefaults {
    fn default() -> Self {
        Self {
            duration_in_ms: 150,
            duration_out_ms: 75,
            delay_ms: 0,
            scale_percent: 95,
            origin: "center".to_string(),
            easing: "cubic-bezier(0.4, 0.0, 0.2, 1)".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        if config.prefix.is_empty() {
            return Err(DirectiveError::Config("prefix must not be empty".to_string()));
        }
        Ok(config)
    }
}
