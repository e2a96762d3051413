// Context module
// Execution context values handed to generated code, as a closed set of variants

pub mod summarizer;


use std::collections::BTreeMap;

use anyhow::anyhow;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;

use crate::Result;

pub use summarizer::{SummaryConfig, summarize_context};

/// JSON object key marking a base64-encoded binary value in CLI input
pub const BYTES_MARKER: &str = "$bytes_b64";
/// JSON object key naming an opaque value's type in CLI input
pub const TYPE_MARKER: &str = "$type";

/// Ordered so summaries list keys deterministically
pub type ContextMap = BTreeMap<String, ContextValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    /// Raw bytes, already decoded
    Binary(Vec<u8>),
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
    Null,
    /// A value the summarizer can only describe by its type name
    Other { type_name: String },
}

impl ContextValue {
    #[inline]
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    #[inline]
    pub fn other(type_name: impl Into<String>) -> Self {
        Self::Other {
            type_name: type_name.into(),
        }
    }

    /// Type label shown next to each summarized value
    #[inline]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Binary(_) => "bytes",
            Self::String(_) => "str",
            Self::Integer(_) => "int",
            Self::Float(_) => "float",
            Self::Boolean(_) => "bool",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::Null => "null",
            Self::Other { type_name } => type_name,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value, honouring the `$bytes_b64` and `$type` markers.
    ///
    /// `{"$bytes_b64": "..."}` becomes [`ContextValue::Binary`] and
    /// `{"$type": "datetime"}` becomes [`ContextValue::Other`]. Any other
    /// object is a regular map.
    #[inline]
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(object) => {
                if object.len() == 1 {
                    if let Some(Value::String(encoded)) = object.get(BYTES_MARKER) {
                        let decoded = BASE64.decode(encoded.trim()).map_err(|e| {
                            anyhow!("Invalid base64 in '{}' value: {}", BYTES_MARKER, e)
                        })?;
                        return Ok(Self::Binary(decoded));
                    }
                    if let Some(Value::String(type_name)) = object.get(TYPE_MARKER) {
                        return Ok(Self::other(type_name.as_str()));
                    }
                }
                Self::Map(
                    object
                        .into_iter()
                        .map(|(key, value)| Ok((key, Self::from_json(value)?)))
                        .collect::<Result<BTreeMap<_, _>>>()?,
                )
            }
        })
    }
}

/// Parse a JSON object into a context map.
#[inline]
pub fn parse_context_json(json: &str) -> Result<ContextMap> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| anyhow!("Context is not valid JSON: {}", e))?;
    match ContextValue::from_json(value)? {
        ContextValue::Map(map) => Ok(map),
        other => Err(anyhow!(
            "Context must be a JSON object, got {}",
            other.type_name()
        )
        .into()),
    }
}

impl From<&str> for ContextValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ContextValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&[u8]> for ContextValue {
    #[inline]
    fn from(value: &[u8]) -> Self {
        Self::Binary(value.to_vec())
    }
}

impl From<i64> for ContextValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ContextValue {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ContextValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<T: Into<ContextValue>> From<Vec<T>> for ContextValue {
    #[inline]
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}
