//! Flat tool parameter mapping and the extraction helpers every tool uses.
//!
//! Hosts tend to send everything as strings, so the helpers are lenient in
//! what they accept: numbers may arrive as `"50"`, booleans as `"yes"`, and
//! structured values as JSON-encoded strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ToolError};

/// Parameters for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value; anything but an object yields an empty set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    /// Trimmed, non-empty string value.  Numbers and booleans are accepted
    /// and stringified.
    pub fn optional_str(&self, name: &str) -> Option<String> {
        let raw = match self.get(name)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!raw.is_empty()).then_some(raw)
    }

    /// Like [`Params::optional_str`] but absence is an error.
    pub fn required_str(&self, tool: &str, name: &str) -> Result<String> {
        self.optional_str(name)
            .ok_or_else(|| ToolError::invalid(tool, format!("Missing parameter: {name}")))
    }

    // -----------------------------------------------------------------------
    // Numbers and flags
    // -----------------------------------------------------------------------

    /// Integer value, accepting numeric strings and truncating floats.
    pub fn optional_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
            }
            _ => None,
        }
    }

    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        self.optional_i64(name).unwrap_or(default)
    }

    /// Boolean flag, `None` when absent or blank.  Strings `true`, `1` and
    /// `yes` (any case) are truthy, every other present string is falsy.
    pub fn optional_flag(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty())
                    .then(|| matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            }
            _ => None,
        }
    }

    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.optional_flag(name).unwrap_or(default)
    }

    // -----------------------------------------------------------------------
    // Structured values
    // -----------------------------------------------------------------------

    /// A structured value given either inline or as a JSON-encoded string.
    pub fn json_value(&self, tool: &str, name: &str) -> Result<Option<Value>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => serde_json::from_str(s.trim())
                .map(Some)
                .map_err(|e| ToolError::invalid(tool, format!("Invalid JSON in {name}: {e}"))),
            Some(other) => Ok(Some(other.clone())),
        }
    }

    /// [`Params::json_value`] restricted to arrays.
    pub fn json_array(&self, tool: &str, name: &str) -> Result<Option<Vec<Value>>> {
        match self.json_value(tool, name)? {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(_) => Err(ToolError::invalid(
                tool,
                format!("{name} must be a JSON array"),
            )),
        }
    }

    /// [`Params::json_value`] restricted to objects.
    pub fn json_object(&self, tool: &str, name: &str) -> Result<Option<Map<String, Value>>> {
        match self.json_value(tool, name)? {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(ToolError::invalid(
                tool,
                format!("{name} must be a JSON object"),
            )),
        }
    }

    /// [`Params::json_array`] where absence is an error.
    pub fn required_array(&self, tool: &str, name: &str) -> Result<Vec<Value>> {
        self.json_array(tool, name)?
            .ok_or_else(|| ToolError::invalid(tool, format!("Missing parameter: {name}")))
    }

    /// List of ids given as a JSON array or a comma-separated string.
    /// Blank entries are dropped.
    pub fn id_list(&self, name: &str) -> Vec<String> {
        let items: Vec<String> = match self.get(name) {
            Some(Value::Array(items)) => items.iter().map(value_to_plain_string).collect(),
            Some(Value::String(s)) => {
                let s = s.trim();
                match serde_json::from_str::<Value>(s) {
                    Ok(Value::Array(items)) => items.iter().map(value_to_plain_string).collect(),
                    _ => s.split(',').map(str::to_string).collect(),
                }
            }
            Some(Value::Number(n)) => vec![n.to_string()],
            _ => Vec::new(),
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
