//! Normalized records.
//!
//! A [`Record`] holds everything the cache knows about one entity. Edges to
//! other entities are [`RecordValue::Reference`] values; every other nesting
//! (lists, objects) is stored inline.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::key::CacheKey;

/// Metadata entry written by date tracking: when the field was received.
pub const RECEIVED_DATE_METADATA: &str = "received_date";

/// Metadata entry written by date tracking: when the field expires.
pub const EXPIRATION_DATE_METADATA: &str = "expiration_date";

/// Per-field metadata.
pub type FieldMetadata = BTreeMap<String, JsonValue>;

/// Field-level error cached in place of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }
}

/// A value stored in a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordValue {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Reference(CacheKey),
    List(Vec<RecordValue>),
    Object(BTreeMap<String, RecordValue>),
    Error(FieldError),
}

impl RecordValue {
    pub fn is_error(&self) -> bool {
        matches!(self, RecordValue::Error(_))
    }

    pub fn as_reference(&self) -> Option<&CacheKey> {
        match self {
            RecordValue::Reference(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RecordValue]> {
        match self {
            RecordValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, RecordValue>> {
        match self {
            RecordValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::String(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::String(s)
    }
}

impl From<i64> for RecordValue {
    fn from(i: i64) -> Self {
        RecordValue::Int(i)
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        RecordValue::Boolean(b)
    }
}

impl From<f64> for RecordValue {
    fn from(f: f64) -> Self {
        RecordValue::Float(f)
    }
}

impl From<CacheKey> for RecordValue {
    fn from(key: CacheKey) -> Self {
        RecordValue::Reference(key)
    }
}

impl From<Vec<RecordValue>> for RecordValue {
    fn from(items: Vec<RecordValue>) -> Self {
        RecordValue::List(items)
    }
}

/// One normalized entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: CacheKey,
    #[serde(rename = "type")]
    pub type_name: String,
    pub fields: BTreeMap<String, RecordValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, FieldMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_id: Option<Uuid>,
}

impl Record {
    /// Create an empty record.
    pub fn new(key: impl Into<CacheKey>, type_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            metadata: BTreeMap::new(),
            mutation_id: None,
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder-style metadata insertion for one field.
    pub fn with_metadata(
        mut self,
        field: impl Into<String>,
        name: impl Into<String>,
        value: JsonValue,
    ) -> Self {
        self.metadata
            .entry(field.into())
            .or_default()
            .insert(name.into(), value);
        self
    }

    /// Builder-style mutation id.
    pub fn with_mutation_id(mut self, mutation_id: Uuid) -> Self {
        self.mutation_id = Some(mutation_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&RecordValue> {
        self.fields.get(field)
    }

    pub fn field_metadata(&self, field: &str) -> Option<&FieldMetadata> {
        self.metadata.get(field)
    }

    /// Field keys of this record in `"<key>.<field>"` form.
    pub fn field_keys(&self) -> BTreeSet<String> {
        self.fields
            .keys()
            .map(|field| self.key.field_path(field))
            .collect()
    }

    /// Every key referenced from this record, at any nesting depth.
    pub fn referenced_keys(&self) -> BTreeSet<CacheKey> {
        let mut keys = BTreeSet::new();
        let mut pending: VecDeque<&RecordValue> = self.fields.values().collect();
        while let Some(value) = pending.pop_front() {
            match value {
                RecordValue::Reference(key) => {
                    keys.insert(key.clone());
                }
                RecordValue::List(items) => pending.extend(items.iter()),
                RecordValue::Object(map) => pending.extend(map.values()),
                _ => {}
            }
        }
        keys
    }

    /// Stamp `received_date` / `expiration_date` (epoch seconds) into the
    /// metadata of every field. Returns the record unchanged if both are `None`.
    pub fn with_dates(mut self, received_date: Option<i64>, expiration_date: Option<i64>) -> Self {
        if received_date.is_none() && expiration_date.is_none() {
            return self;
        }
        let field_names: Vec<String> = self.fields.keys().cloned().collect();
        for field in field_names {
            let entry = self.metadata.entry(field).or_default();
            if let Some(received) = received_date {
                entry.insert(RECEIVED_DATE_METADATA.to_string(), JsonValue::from(received));
            }
            if let Some(expiration) = expiration_date {
                entry.insert(
                    EXPIRATION_DATE_METADATA.to_string(),
                    JsonValue::from(expiration),
                );
            }
        }
        self
    }

    /// Latest `received_date` stamped on any field.
    pub fn received_date(&self) -> Option<i64> {
        self.max_metadata_date(RECEIVED_DATE_METADATA)
    }

    /// Latest `expiration_date` stamped on any field.
    pub fn expiration_date(&self) -> Option<i64> {
        self.max_metadata_date(EXPIRATION_DATE_METADATA)
    }

    fn max_metadata_date(&self, name: &str) -> Option<i64> {
        self.metadata
            .values()
            .filter_map(|m| m.get(name).and_then(JsonValue::as_i64))
            .max()
    }

    /// Approximate weight in bytes, as computed by the default weigher.
    pub fn size_in_bytes(&self) -> usize {
        crate::weigher::RecordWeigher::weigh(self)
    }
}
