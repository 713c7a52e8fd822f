//! Structured configuration document consumed from the submission layer.
//!
//! # Responsibility
//! - Wrap one decoded configuration object (JSON object semantics).
//! - Offer `has`/`get` navigation plus typed field accessors for step
//!   factories.
//!
//! # Invariants
//! - A document is always an object; scalars and arrays only appear as
//!   field values.
//! - Accessors never panic on unexpected shapes; they return `None`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Nested key/value configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument {
    fields: Map<String, Value>,
}

/// Structured input that is not a configuration object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    NotAnObject(&'static str),
    InvalidJson(String),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject(found) => {
                write!(f, "configuration document must be an object, got {found}")
            }
            Self::InvalidJson(message) => write!(f, "configuration document is not valid json: {message}"),
        }
    }
}

impl Error for DocumentError {}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a decoded JSON value; only objects are accepted.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(DocumentError::NotAnObject(value_kind(&other))),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, DocumentError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| DocumentError::InvalidJson(err.to_string()))?;
        Self::from_value(value)
    }

    /// Returns whether a field with this key is present (any shape).
    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns the nested document stored under `key`.
    ///
    /// `null` is treated as an empty fragment, matching form encoders that
    /// submit a bare checkbox for parameterless steps.
    pub fn get(&self, key: &str) -> Option<ConfigDocument> {
        match self.fields.get(key)? {
            Value::Object(fields) => Some(Self {
                fields: fields.clone(),
            }),
            Value::Null => Some(Self::new()),
            _ => None,
        }
    }

    /// Returns nested documents stored under `key` as an ordered array.
    ///
    /// A single object is accepted as a one-element array.
    pub fn get_array(&self, key: &str) -> Vec<ConfigDocument> {
        match self.fields.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(fields) => Some(Self {
                        fields: fields.clone(),
                    }),
                    _ => None,
                })
                .collect(),
            Some(Value::Object(fields)) => vec![Self {
                fields: fields.clone(),
            }],
            _ => vec![],
        }
    }

    /// Returns a trimmed, non-empty string field.
    pub fn str(&self, key: &str) -> Option<&str> {
        match self.fields.get(key)? {
            Value::String(value) => {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            _ => None,
        }
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.fields.get(key)? {
            Value::Bool(value) => Some(*value),
            Value::String(value) => match value.trim() {
                "true" | "on" => Some(true),
                "false" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns an unsigned integer field; numeric strings are accepted.
    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.fields.get(key)? {
            Value::Number(value) => value.as_u64(),
            Value::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns a list of names from either a JSON array of strings or a
    /// comma-separated string. Blank items are dropped.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::String(value)) => value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            _ => vec![],
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
