// Shared data model for documents, chunks, collections and query results

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Dimension reported for collections whose metadata does not record one
pub const DEFAULT_DIMENSION: u32 = 1536;

/// Metadata key holding the stable chunk identifier
pub const ID_KEY: &str = "id";

/// Current time as an ISO-8601 UTC timestamp with millisecond precision
#[inline]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time, or `previous` plus one millisecond when the clock has not
/// moved past `previous` at millisecond precision. Always strictly later than
/// a parseable `previous`.
#[inline]
pub fn timestamp_after(previous: Option<&str>) -> String {
    let now = Utc::now().trunc_subsecs(3);
    let next = previous
        .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
        .map(|p| p.with_timezone(&Utc) + TimeDelta::milliseconds(1))
        .filter(|floor| *floor > now)
        .unwrap_or(now);
    next.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A single scalar metadata value.
///
/// Integers and floats are kept apart so that values written to the store
/// serialize exactly as they were read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    /// Convert an arbitrary JSON value, rejecting arrays and objects
    #[inline]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    #[inline]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Whether the value counts as "set" when deriving identifiers.
    ///
    /// Empty strings, zero, `false` and null are all treated as absent.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::Str(s) => !s.is_empty(),
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for MetadataValue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            // Whole floats print without a fractional part so "1.0" and "1" give the same id
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
                write!(f, "{}", *v as i64)
            }
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetadataValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for MetadataValue {
    #[inline]
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or(Self::Float(value as f64), Self::Int)
    }
}

impl From<f64> for MetadataValue {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered string-keyed metadata map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.0.insert(key.into(), value.into());
    }

    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.0.remove(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// The chunk identifier, if one has been assigned
    #[inline]
    pub fn id(&self) -> Option<&str> {
        self.get(ID_KEY)
            .and_then(MetadataValue::as_str)
            .filter(|id| !id.is_empty())
    }

    #[inline]
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.insert(ID_KEY, id.into());
    }

    /// Copy of this map with null values dropped, as the store rejects them
    #[inline]
    pub fn without_nulls(&self) -> Self {
        self.0
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Overlay `other` on top of this map, returning the merged result
    #[inline]
    pub fn merged(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Build from a JSON object, skipping nested arrays and objects
    #[inline]
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .iter()
            .filter_map(|(key, value)| {
                MetadataValue::from_json(value).map(|value| (key.clone(), value))
            })
            .collect()
    }

    #[inline]
    pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect()
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    #[inline]
    fn from_iter<T: IntoIterator<Item = (String, MetadataValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Metadata {
    type Item = (String, MetadataValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, MetadataValue>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A unit of text plus its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    #[inline]
    pub fn new(page_content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }
}

/// A stored chunk returned from the store, decorated for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub page_content: String,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_related: bool,
}

impl QueryResult {
    #[inline]
    pub fn id(&self) -> &str {
        self.metadata.id().unwrap_or_default()
    }
}

/// Summary of a collection as shown in listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
    pub dimension: u32,
    pub metadata: Metadata,
}

impl CollectionInfo {
    #[inline]
    pub fn new(name: impl Into<String>, count: usize, metadata: Metadata) -> Self {
        let dimension = dimension_from_metadata(&metadata);
        Self {
            name: name.into(),
            count,
            dimension,
            metadata,
        }
    }
}

/// Read the `dimension` entry, falling back to [`DEFAULT_DIMENSION`]
#[inline]
pub fn dimension_from_metadata(metadata: &Metadata) -> u32 {
    metadata
        .get("dimension")
        .and_then(MetadataValue::as_f64)
        .filter(|dim| *dim >= 1.0 && *dim <= f64::from(u32::MAX))
        .map_or(DEFAULT_DIMENSION, |dim| dim as u32)
}
