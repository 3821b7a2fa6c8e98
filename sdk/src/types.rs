//! Tool input/output types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A step parameter value: a scalar or a flat list of scalars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Convert a JSON value into a parameter value.
    ///
    /// Returns `None` for objects, nulls, and lists nested inside lists.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        Self::from_json_inner(value, true)
    }

    fn from_json_inner(value: &serde_json::Value, allow_list: bool) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Number),
            },
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(items) if allow_list => items
                .iter()
                .map(|item| Self::from_json_inner(item, false))
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            _ => None,
        }
    }

    /// Borrow the value as a string slice if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; integral floats and numeric strings are accepted
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in validation messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Input to a tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub action: String,
    pub params: BTreeMap<String, ParamValue>,
}

impl ToolInput {
    /// Create a new ToolInput
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<&str, ToolError> {
        self.params
            .get(key)
            .and_then(ParamValue::as_str)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an i64 parameter
    pub fn param_i64(&self, key: &str) -> Result<i64, ToolError> {
        self.params
            .get(key)
            .and_then(ParamValue::as_i64)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(ParamValue::as_str)
    }

    /// Get an optional i64 parameter
    pub fn param_i64_opt(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(ParamValue::as_i64)
    }

    /// Get an optional bool parameter
    pub fn param_bool_opt(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(ParamValue::as_bool)
    }
}

/// Output from a successful tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Structured payload as returned by the tool
    pub data: serde_json::Value,

    /// Plain-text rendering used for synthesis and degraded summaries
    pub text: String,

    /// Where the information came from (URL, document path, provider)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ToolOutput {
    /// Create a text-only output
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            data: serde_json::json!({ "text": text }),
            text,
            source: None,
        }
    }

    /// Create an output with structured data and its text rendering
    pub fn json(data: serde_json::Value, text: impl Into<String>) -> Self {
        Self {
            data,
            text: text.into(),
            source: None,
        }
    }

    /// Attach a source attribution
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// True when the tool produced nothing usable
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Tool-specific errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    #[error("Tool unavailable: {0}")]
    Unavailable(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    /// Short machine-friendly name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Timeout(_) => "timeout",
            Self::DomainNotAllowed(_) => "domain_not_allowed",
            Self::Unavailable(_) => "unavailable",
            Self::Execution(_) => "execution",
        }
    }

    /// Whether repeating the same call could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Unavailable(_) | Self::Execution(_)
        )
    }
}
