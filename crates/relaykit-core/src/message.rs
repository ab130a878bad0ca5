//! Output messages produced by a tool invocation.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One host-recognised output message.
///
/// The set is fixed: plain text, a JSON blob, or a named variable binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolMessage {
    /// Plain text for the user.
    Text { text: String },
    /// A JSON value.
    Json { json: Value },
    /// A value bound to a name for downstream steps.
    Variable { name: String, value: Value },
}

impl ToolMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn json(json: Value) -> Self {
        Self::Json { json }
    }

    pub fn variable(name: impl Into<String>, value: Value) -> Self {
        Self::Variable {
            name: name.into(),
            value,
        }
    }

    /// The `{success: false, error_msg}` shape used for failed invocations.
    pub fn failure(error_msg: impl Into<String>) -> Self {
        Self::json(json!({
            "success": false,
            "error_msg": error_msg.into(),
        }))
    }

    /// Borrow the text payload, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Borrow the JSON payload, if this is a JSON message.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json { json } => Some(json),
            _ => None,
        }
    }
}
