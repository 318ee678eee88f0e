//! Dynamic values passed to and returned from statements.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;

/// Named parameter values.
pub type Params = BTreeMap<String, Value>;

/// Dynamic value type for bindings and result cells.
///
/// `List` and `Set` are caller-facing collections; before execution they are
/// converted to `Tuple`, which the engine expands into one placeholder per
/// element (`IN (?, ?, ?)`). `Array` is a literal array and is bound as one
/// value, a JSON array on the sqlx engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Unordered collection.
    Set(Vec<Value>),
    /// Fixed-arity group, expanded element-wise on binding.
    Tuple(Vec<Value>),
    /// Literal array, never expanded.
    Array(Vec<Value>),
    /// Name to value mapping; used for bulk groups.
    Map(Params),
}

impl Value {
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Collects into a set; duplicate elements are dropped.
    pub fn set<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        let mut unique: Vec<Value> = Vec::new();
        for item in items.into_iter().map(Into::into) {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Value::Set(unique)
    }

    pub fn tuple<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// A literal array that is bound as one value rather than expanded.
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<String>, V: Into<Value>>(items: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(bytes.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Prepares a value for binding: sequences and sets become tuples.
    pub(crate) fn into_bindable(self) -> Value {
        match self {
            Value::List(items) | Value::Set(items) => Value::Tuple(items),
            other => other,
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::List(items) | Value::Set(items) | Value::Tuple(items) | Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

/// Arguments for one statement invocation.
///
/// Statements are called with named values. Positional groups exist only for
/// bulk execution, where each group is a mapping of names to values; mixing
/// the two is rejected at invocation time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub(crate) named: Params,
    pub(crate) positional: Vec<Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named value.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Add one positional group.
    pub fn group(mut self, group: impl Into<Value>) -> Self {
        self.positional.push(group.into());
        self
    }

    /// Add several positional groups.
    pub fn groups<T: Into<Value>>(mut self, groups: impl IntoIterator<Item = T>) -> Self {
        self.positional.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn named(&self) -> &Params {
        &self.named
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }
}

impl From<Params> for Args {
    fn from(named: Params) -> Self {
        Self {
            named,
            positional: Vec::new(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Args::new(), |args, (k, v)| args.bind(k, v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v)
    }
}

impl<T: Into<Value>> From<HashSet<T>> for Value {
    fn from(v: HashSet<T>) -> Self {
        Value::set(v)
    }
}

impl<T: Into<Value>> From<BTreeSet<T>> for Value {
    fn from(v: BTreeSet<T>) -> Self {
        Value::set(v)
    }
}

impl From<Params> for Value {
    fn from(v: Params) -> Self {
        Value::Map(v)
    }
}
