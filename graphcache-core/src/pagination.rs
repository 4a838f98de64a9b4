//! Field mergers for paginated lists.
//!
//! Both mergers plug into [`FieldRecordMerger`](crate::merge::FieldRecordMerger)
//! and keep their pagination state in field metadata, which the normalizer
//! fills in from the query arguments.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::merge::{FieldInfo, FieldMerger};
use crate::record::RecordValue;

/// Metadata entry holding the position of a list window.
pub const OFFSET_METADATA: &str = "offset";

/// Splices offset-addressed list windows.
///
/// With an existing window `[eo, eo + |e|)` and an incoming window
/// `[io, io + |i|)`, contiguous or overlapping windows merge into the union
/// range, incoming items winning where they overlap. Disjoint windows have no
/// known ordering relationship, so the incoming window replaces the existing
/// one.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetWindowFieldMerger;

impl FieldMerger for OffsetWindowFieldMerger {
    fn merge_fields(&self, existing: FieldInfo, incoming: FieldInfo) -> FieldInfo {
        let (Some(existing_offset), Some(incoming_offset)) = (
            existing.metadata_i64(OFFSET_METADATA),
            incoming.metadata_i64(OFFSET_METADATA),
        ) else {
            return incoming;
        };
        let (RecordValue::List(existing_items), RecordValue::List(incoming_items)) =
            (&existing.value, &incoming.value)
        else {
            return incoming;
        };

        let existing_end = existing_offset.saturating_add(existing_items.len() as i64);
        let incoming_end = incoming_offset.saturating_add(incoming_items.len() as i64);
        if incoming_offset > existing_end || existing_offset > incoming_end {
            return incoming;
        }

        let start = existing_offset.min(incoming_offset);
        let end = existing_end.max(incoming_end);
        let merged: Vec<RecordValue> = (start..end)
            .filter_map(|position| {
                if (incoming_offset..incoming_end).contains(&position) {
                    incoming_items.get((position - incoming_offset) as usize)
                } else {
                    existing_items.get((position - existing_offset) as usize)
                }
            })
            .cloned()
            .collect();

        let mut metadata = existing.metadata;
        metadata.extend(incoming.metadata);
        metadata.insert(OFFSET_METADATA.to_string(), JsonValue::from(start));
        FieldInfo::new(RecordValue::List(merged), metadata)
    }
}

/// Metadata entries used by [`ConnectionFieldMerger`].
pub const START_CURSOR_METADATA: &str = "startCursor";
pub const END_CURSOR_METADATA: &str = "endCursor";
pub const BEFORE_METADATA: &str = "before";
pub const AFTER_METADATA: &str = "after";

const EDGES: &str = "edges";
const PAGE_INFO: &str = "pageInfo";

/// Cursor-based (Relay connection) pagination.
///
/// A page requested with `after == existing endCursor` is appended, a page
/// requested with `before == existing startCursor` is prepended, and any other
/// page resets the connection. Requests without `before`/`after` are not
/// pagination and replace the stored value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionFieldMerger;

impl FieldMerger for ConnectionFieldMerger {
    fn merge_fields(&self, existing: FieldInfo, incoming: FieldInfo) -> FieldInfo {
        let before = incoming.metadata_str(BEFORE_METADATA);
        let after = incoming.metadata_str(AFTER_METADATA);
        if before.is_none() && after.is_none() {
            return incoming;
        }

        let (Some(existing_start), Some(existing_end)) = (
            existing.metadata_str(START_CURSOR_METADATA),
            existing.metadata_str(END_CURSOR_METADATA),
        ) else {
            return incoming;
        };
        let (Some(incoming_start), Some(incoming_end)) = (
            incoming.metadata_str(START_CURSOR_METADATA),
            incoming.metadata_str(END_CURSOR_METADATA),
        ) else {
            return existing;
        };

        let (RecordValue::Object(existing_value), RecordValue::Object(incoming_value)) =
            (&existing.value, &incoming.value)
        else {
            return incoming;
        };
        let existing_edges = edges(existing_value);
        let incoming_edges = edges(incoming_value);

        let mut merged_value = existing_value.clone();
        let (merged_edges, start_cursor, end_cursor) = if after == Some(existing_end) {
            merge_page_info(&mut merged_value, incoming_value, &["endCursor", "hasNextPage"]);
            (
                [existing_edges, incoming_edges].concat(),
                existing_start,
                incoming_end,
            )
        } else if before == Some(existing_start) {
            merge_page_info(
                &mut merged_value,
                incoming_value,
                &["startCursor", "hasPreviousPage"],
            );
            (
                [incoming_edges, existing_edges].concat(),
                incoming_start,
                existing_end,
            )
        } else {
            merged_value = incoming_value.clone();
            (incoming_edges.to_vec(), incoming_start, incoming_end)
        };
        merged_value.insert(EDGES.to_string(), RecordValue::List(merged_edges));
        let (start_cursor, end_cursor) = (start_cursor.to_string(), end_cursor.to_string());

        let mut metadata = existing.metadata;
        metadata.extend(incoming.metadata);
        metadata.remove(BEFORE_METADATA);
        metadata.remove(AFTER_METADATA);
        metadata.insert(
            START_CURSOR_METADATA.to_string(),
            JsonValue::from(start_cursor),
        );
        metadata.insert(END_CURSOR_METADATA.to_string(), JsonValue::from(end_cursor));
        FieldInfo::new(RecordValue::Object(merged_value), metadata)
    }
}

fn edges(connection: &BTreeMap<String, RecordValue>) -> &[RecordValue] {
    connection
        .get(EDGES)
        .and_then(RecordValue::as_list)
        .unwrap_or(&[])
}

fn merge_page_info(
    merged: &mut BTreeMap<String, RecordValue>,
    incoming: &BTreeMap<String, RecordValue>,
    entries: &[&str],
) {
    let Some(incoming_info) = incoming.get(PAGE_INFO).and_then(RecordValue::as_object) else {
        return;
    };
    let mut info = merged
        .get(PAGE_INFO)
        .and_then(RecordValue::as_object)
        .cloned()
        .unwrap_or_default();
    for entry in entries {
        if let Some(value) = incoming_info.get(*entry) {
            info.insert((*entry).to_string(), value.clone());
        }
    }
    merged.insert(PAGE_INFO.to_string(), RecordValue::Object(info));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn window(offset: i64, items: &[i64]) -> FieldInfo {
        let mut metadata = BTreeMap::new();
        metadata.insert(OFFSET_METADATA.to_string(), json!(offset));
        FieldInfo::new(
            RecordValue::List(items.iter().copied().map(RecordValue::Int).collect()),
            metadata,
        )
    }

    fn ints(info: &FieldInfo) -> Vec<i64> {
        info.value
            .as_list()
            .expect("list")
            .iter()
            .map(|v| match v {
                RecordValue::Int(i) => *i,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_offset_window_appends_contiguous_page() {
        let merged = OffsetWindowFieldMerger.merge_fields(window(0, &[0, 1, 2]), window(3, &[3, 4]));
        assert_eq!(ints(&merged), vec![0, 1, 2, 3, 4]);
        assert_eq!(merged.metadata_i64(OFFSET_METADATA), Some(0));
    }

    #[test]
    fn test_offset_window_prepends_and_overlaps() {
        let merged =
            OffsetWindowFieldMerger.merge_fields(window(5, &[5, 6, 7]), window(3, &[30, 40, 50]));
        assert_eq!(ints(&merged), vec![30, 40, 50, 6, 7]);
        assert_eq!(merged.metadata_i64(OFFSET_METADATA), Some(3));
    }

    #[test]
    fn test_offset_window_inner_overlap_keeps_outer_items() {
        let merged =
            OffsetWindowFieldMerger.merge_fields(window(0, &[0, 1, 2, 3]), window(1, &[10, 20]));
        assert_eq!(ints(&merged), vec![0, 10, 20, 3]);
    }

    #[test]
    fn test_offset_window_disjoint_resets() {
        let merged = OffsetWindowFieldMerger.merge_fields(window(0, &[0, 1]), window(10, &[10]));
        assert_eq!(ints(&merged), vec![10]);
        assert_eq!(merged.metadata_i64(OFFSET_METADATA), Some(10));
    }

    #[test]
    fn test_offset_window_without_offsets_takes_incoming() {
        let incoming = FieldInfo::new(RecordValue::List(vec![]), BTreeMap::new());
        let merged = OffsetWindowFieldMerger.merge_fields(window(0, &[1]), incoming.clone());
        assert_eq!(merged, incoming);
    }

    fn page(
        edges: &[&str],
        start: &str,
        end: &str,
        args: &[(&str, &str)],
        has_next: bool,
    ) -> FieldInfo {
        let mut value = BTreeMap::new();
        value.insert(
            EDGES.to_string(),
            RecordValue::List(edges.iter().map(|e| RecordValue::from(*e)).collect()),
        );
        let mut info = BTreeMap::new();
        info.insert("startCursor".to_string(), RecordValue::from(start));
        info.insert("endCursor".to_string(), RecordValue::from(end));
        info.insert("hasNextPage".to_string(), RecordValue::Boolean(has_next));
        value.insert(PAGE_INFO.to_string(), RecordValue::Object(info));

        let mut metadata = BTreeMap::new();
        metadata.insert(START_CURSOR_METADATA.to_string(), json!(start));
        metadata.insert(END_CURSOR_METADATA.to_string(), json!(end));
        for (name, cursor) in args {
            metadata.insert((*name).to_string(), json!(cursor));
        }
        FieldInfo::new(RecordValue::Object(value), metadata)
    }

    fn edge_names(info: &FieldInfo) -> Vec<String> {
        info.value
            .as_object()
            .and_then(|o| o.get(EDGES))
            .and_then(RecordValue::as_list)
            .expect("edges")
            .iter()
            .filter_map(|e| e.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_connection_appends_next_page() {
        let first = page(&["a", "b"], "a", "b", &[], true);
        let next = page(&["c"], "c", "c", &[(AFTER_METADATA, "b")], false);
        let merged = ConnectionFieldMerger.merge_fields(first, next);

        assert_eq!(edge_names(&merged), vec!["a", "b", "c"]);
        assert_eq!(merged.metadata_str(START_CURSOR_METADATA), Some("a"));
        assert_eq!(merged.metadata_str(END_CURSOR_METADATA), Some("c"));
        let info = merged
            .value
            .as_object()
            .and_then(|o| o.get(PAGE_INFO))
            .and_then(RecordValue::as_object)
            .expect("pageInfo");
        assert_eq!(info.get("hasNextPage"), Some(&RecordValue::Boolean(false)));
        assert_eq!(info.get("startCursor"), Some(&RecordValue::from("a")));
    }

    #[test]
    fn test_connection_append_keeps_date_metadata() {
        let mut first = page(&["a"], "a", "a", &[], true);
        first.metadata.insert("received_date".to_string(), json!(100));
        first.metadata.insert("expiration_date".to_string(), json!(200));
        let mut next = page(&["b"], "b", "b", &[(AFTER_METADATA, "a")], false);
        next.metadata.insert("expiration_date".to_string(), json!(400));

        let merged = ConnectionFieldMerger.merge_fields(first, next);
        assert_eq!(edge_names(&merged), vec!["a", "b"]);
        assert_eq!(merged.metadata_i64("received_date"), Some(100));
        assert_eq!(merged.metadata_i64("expiration_date"), Some(400));
        assert_eq!(merged.metadata_str(AFTER_METADATA), None);
        assert_eq!(merged.metadata_str(END_CURSOR_METADATA), Some("b"));
    }

    #[test]
    fn test_offset_window_far_offsets_do_not_overflow() {
        let merged =
            OffsetWindowFieldMerger.merge_fields(window(i64::MAX - 1, &[1, 2, 3]), window(0, &[9]));
        assert_eq!(ints(&merged), vec![9]);
    }

    #[test]
    fn test_connection_prepends_previous_page() {
        let current = page(&["c", "d"], "c", "d", &[], true);
        let previous = page(&["a", "b"], "a", "b", &[(BEFORE_METADATA, "c")], true);
        let merged = ConnectionFieldMerger.merge_fields(current, previous);
        assert_eq!(edge_names(&merged), vec!["a", "b", "c", "d"]);
        assert_eq!(merged.metadata_str(START_CURSOR_METADATA), Some("a"));
        assert_eq!(merged.metadata_str(END_CURSOR_METADATA), Some("d"));
    }

    #[test]
    fn test_connection_unrelated_page_resets() {
        let current = page(&["a"], "a", "a", &[], true);
        let unrelated = page(&["x"], "x", "x", &[(AFTER_METADATA, "w")], true);
        let merged = ConnectionFieldMerger.merge_fields(current, unrelated);
        assert_eq!(edge_names(&merged), vec!["x"]);
    }

    #[test]
    fn test_connection_non_paginated_request_replaces() {
        let current = page(&["a"], "a", "a", &[], true);
        let fresh = page(&["z"], "z", "z", &[], true);
        let merged = ConnectionFieldMerger.merge_fields(current, fresh.clone());
        assert_eq!(merged, fresh);
    }
}
