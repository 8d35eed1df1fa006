//! Loosely-typed configuration tree used by overrides

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Type category of a configuration value.
///
/// Overrides may only replace a leaf with a value of the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Map,
    Array,
    Null,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Boolean => "bool",
            ValueKind::Map => "map",
            ValueKind::Array => "array",
            ValueKind::Null => "null",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A node of the configuration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Map(BTreeMap<String, ConfigValue>),
    /// Arrays, null and integers outside the i64 range
    Other(Value),
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::String(_) => ValueKind::String,
            ConfigValue::Integer(_) | ConfigValue::Float(_) => ValueKind::Number,
            ConfigValue::Boolean(_) => ValueKind::Boolean,
            ConfigValue::Map(_) => ValueKind::Map,
            ConfigValue::Other(Value::Array(_)) => ValueKind::Array,
            ConfigValue::Other(Value::Number(_)) => ValueKind::Number,
            ConfigValue::Other(_) => ValueKind::Null,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a dotted path such as `limits.mem_mb`
    pub fn get_path(&self, dotted: &str) -> Option<&ConfigValue> {
        dotted
            .split('.')
            .try_fold(self, |node, key| node.as_map()?.get(key))
    }

    /// Parse a JSON document
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Serialize with tab indentation and a trailing newline.
    ///
    /// Map keys come out sorted, so equal trees always produce equal bytes.
    pub fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        out.push(b'\n');
        Ok(out)
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ConfigValue::String(s),
            Value::Bool(b) => ConfigValue::Boolean(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigValue::Integer(i)
                } else if n.is_f64() {
                    ConfigValue::Float(n.as_f64().unwrap_or_default())
                } else {
                    ConfigValue::Other(Value::Number(n))
                }
            }
            Value::Object(map) => ConfigValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
            other => ConfigValue::Other(other),
        }
    }
}

impl From<ConfigValue> for Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::String(s) => Value::String(s),
            ConfigValue::Integer(i) => Value::Number(i.into()),
            ConfigValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            ConfigValue::Boolean(b) => Value::Bool(b),
            ConfigValue::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Map<String, Value>>(),
            ),
            ConfigValue::Other(v) => v,
        }
    }
}
