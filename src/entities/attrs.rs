//! Generic attribute storage shared by host attributes, preferences and
//! node metadata bags.
//!
//! Fusion hands back loosely typed tables: comp attributes (`COMPN_GlobalStart`),
//! frame-format preferences (`Comp.FrameFormat.Rate`) and the per-tool data
//! bags written with `SetData`. All of them map onto [`AttrValue`] / [`Attrs`].
//!
//! Numeric getters coerce between `Int` and `Float` because the host reports
//! frame numbers as floats while the pipeline treats them as integers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generic attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<AttrValue>),
    Map(IndexMap<String, AttrValue>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.is_finite() => Some(v.round() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, AttrValue>> {
        match self {
            AttrValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Text rendering used when values are coerced to strings or shown in
    /// diagnostics. Whole floats keep one decimal (`25.0`).
    pub fn to_text(&self) -> String {
        match self {
            AttrValue::Bool(v) => v.to_string(),
            AttrValue::Int(v) => v.to_string(),
            AttrValue::Float(v) => format_number(*v),
            AttrValue::Str(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }

    /// Convert a JSON value into a host value. `null` has no host
    /// counterpart and yields `None`; nulls inside containers are dropped.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(AttrValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(AttrValue::Int(i)),
                None => n.as_f64().map(AttrValue::Float),
            },
            Value::String(s) => Some(AttrValue::Str(s.clone())),
            Value::Array(items) => Some(AttrValue::List(
                items.iter().filter_map(AttrValue::from_json).collect(),
            )),
            Value::Object(map) => Some(AttrValue::Map(
                map.iter()
                    .filter_map(|(k, v)| AttrValue::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Bool(v) => Value::Bool(*v),
            AttrValue::Int(v) => Value::from(*v),
            AttrValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttrValue::Str(s) => Value::String(s.clone()),
            AttrValue::List(items) => Value::Array(items.iter().map(AttrValue::to_json).collect()),
            AttrValue::Map(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

/// Format a float the way the host prints it: whole numbers keep `.0`.
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

/// Attribute container: string key -> typed value, insertion ordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs {
    #[serde(default)]
    map: IndexMap<String, AttrValue>,
}

impl Attrs {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    /// Builder-style insert, handy for batched `SetAttrs`/`SetPrefs` calls.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(AttrValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.map.get(key).and_then(AttrValue::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.map.get(key).and_then(AttrValue::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).and_then(AttrValue::as_bool)
    }

    /// Get bool value with custom default
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Remove attribute by key
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.map.shift_remove(key)
    }

    /// Iterate over all attributes (key, value) in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.map.iter()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Copy every entry of `other` over this one.
    pub fn merge(&mut self, other: &Attrs) {
        for (k, v) in other.iter() {
            self.map.insert(k.clone(), v.clone());
        }
    }
}

impl From<IndexMap<String, AttrValue>> for Attrs {
    fn from(map: IndexMap<String, AttrValue>) -> Self {
        Self { map }
    }
}

impl FromIterator<(String, AttrValue)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}
