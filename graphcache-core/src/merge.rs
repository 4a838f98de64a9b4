//! Record merge strategies.
//!
//! A merger combines the record already stored under a key with an incoming
//! record for the same key and reports which field keys changed. Mergers are
//! pure: they never see sibling records or the store.

use std::collections::BTreeSet;

use serde_json::Value as JsonValue;

use crate::headers::{CacheHeaders, ERRORS_REPLACE_CACHED_VALUES};
use crate::record::{FieldMetadata, Record, RecordValue};

/// Input to a [`RecordMerger`].
#[derive(Debug, Clone, Copy)]
pub struct MergeContext<'a> {
    pub existing: &'a Record,
    pub incoming: &'a Record,
    pub headers: &'a CacheHeaders,
}

impl<'a> MergeContext<'a> {
    /// # Panics
    ///
    /// Panics if the two records have different keys. Merging across keys is a
    /// caller bug, not a recoverable condition.
    pub fn new(existing: &'a Record, incoming: &'a Record, headers: &'a CacheHeaders) -> Self {
        assert_eq!(
            existing.key, incoming.key,
            "cannot merge records with different keys"
        );
        Self {
            existing,
            incoming,
            headers,
        }
    }
}

/// Combines an existing and an incoming record.
pub trait RecordMerger: Send + Sync {
    /// Returns the merged record and the changed field keys (`"<key>.<field>"`).
    fn merge(&self, ctx: MergeContext<'_>) -> (Record, BTreeSet<String>);

    /// True only for the plain field-overwrite strategy. The persistent tier
    /// uses this to skip loading existing rows when errors replace values.
    fn is_field_overwrite(&self) -> bool {
        false
    }
}

impl<F> RecordMerger for F
where
    F: Fn(MergeContext<'_>) -> (Record, BTreeSet<String>) + Send + Sync,
{
    fn merge(&self, ctx: MergeContext<'_>) -> (Record, BTreeSet<String>) {
        self(ctx)
    }
}

/// Incoming fields overwrite existing ones; existing-only fields survive.
///
/// An incoming [`RecordValue::Error`] does not replace an existing non-error
/// value unless [`ERRORS_REPLACE_CACHED_VALUES`] is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRecordMerger;

impl RecordMerger for DefaultRecordMerger {
    fn merge(&self, ctx: MergeContext<'_>) -> (Record, BTreeSet<String>) {
        let MergeContext {
            existing,
            incoming,
            headers,
        } = ctx;
        let errors_replace = headers.has_header(ERRORS_REPLACE_CACHED_VALUES);

        let mut merged = existing.clone();
        let mut changed = BTreeSet::new();
        for (field, incoming_value) in &incoming.fields {
            match existing.fields.get(field) {
                Some(old) if old == incoming_value => {}
                Some(old) if incoming_value.is_error() && !old.is_error() && !errors_replace => {}
                _ => {
                    merged.fields.insert(field.clone(), incoming_value.clone());
                    changed.insert(existing.key.field_path(field));
                }
            }
        }
        merge_metadata(&mut merged, incoming);
        merged.type_name.clone_from(&incoming.type_name);
        merged.mutation_id = incoming.mutation_id;
        (merged, changed)
    }

    fn is_field_overwrite(&self) -> bool {
        true
    }
}

/// Merge incoming metadata into `merged`, incoming entries winning.
fn merge_metadata(merged: &mut Record, incoming: &Record) {
    for (field, entries) in &incoming.metadata {
        let target = merged.metadata.entry(field.clone()).or_default();
        for (name, value) in entries {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// A field value together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub value: RecordValue,
    pub metadata: FieldMetadata,
}

impl FieldInfo {
    pub fn new(value: RecordValue, metadata: FieldMetadata) -> Self {
        Self { value, metadata }
    }

    /// Metadata entry as an integer.
    pub fn metadata_i64(&self, name: &str) -> Option<i64> {
        self.metadata.get(name).and_then(JsonValue::as_i64)
    }

    /// Metadata entry as a string.
    pub fn metadata_str(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).and_then(JsonValue::as_str)
    }
}

/// Merges a single field present in both records.
pub trait FieldMerger: Send + Sync {
    fn merge_fields(&self, existing: FieldInfo, incoming: FieldInfo) -> FieldInfo;
}

impl<F> FieldMerger for F
where
    F: Fn(FieldInfo, FieldInfo) -> FieldInfo + Send + Sync,
{
    fn merge_fields(&self, existing: FieldInfo, incoming: FieldInfo) -> FieldInfo {
        self(existing, incoming)
    }
}

/// Delegates each overlapping field to a [`FieldMerger`].
#[derive(Debug, Clone, Default)]
pub struct FieldRecordMerger<F> {
    field_merger: F,
}

impl<F: FieldMerger> FieldRecordMerger<F> {
    pub fn new(field_merger: F) -> Self {
        Self { field_merger }
    }
}

impl<F: FieldMerger> RecordMerger for FieldRecordMerger<F> {
    fn merge(&self, ctx: MergeContext<'_>) -> (Record, BTreeSet<String>) {
        let MergeContext {
            existing, incoming, ..
        } = ctx;

        let mut merged = existing.clone();
        let mut changed = BTreeSet::new();
        for (field, incoming_value) in &incoming.fields {
            let incoming_meta = incoming.metadata.get(field).cloned().unwrap_or_default();
            let result = match existing.fields.get(field) {
                Some(existing_value) => {
                    let existing_meta = existing.metadata.get(field).cloned().unwrap_or_default();
                    self.field_merger.merge_fields(
                        FieldInfo::new(existing_value.clone(), existing_meta),
                        FieldInfo::new(incoming_value.clone(), incoming_meta),
                    )
                }
                None => FieldInfo::new(incoming_value.clone(), incoming_meta),
            };

            // Metadata is additive: the merger's entries layer over the stored ones.
            let mut metadata = existing.metadata.get(field).cloned().unwrap_or_default();
            metadata.extend(result.metadata);

            let value_changed = existing.fields.get(field) != Some(&result.value);
            let metadata_changed = match existing.metadata.get(field) {
                Some(stored) => *stored != metadata,
                None => !metadata.is_empty(),
            };
            if value_changed || metadata_changed {
                changed.insert(existing.key.field_path(field));
            }

            merged.fields.insert(field.clone(), result.value);
            if !metadata.is_empty() {
                merged.metadata.insert(field.clone(), metadata);
            }
        }
        merged.type_name.clone_from(&incoming.type_name);
        merged.mutation_id = incoming.mutation_id;
        (merged, changed)
    }
}
