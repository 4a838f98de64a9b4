//! Deterministic record weights used for memory accounting.

use crate::record::{Record, RecordValue};

const SIZE_OF_NULL: usize = 4;
const SIZE_OF_BOOLEAN: usize = 16;
const SIZE_OF_INT: usize = 8;
const SIZE_OF_FLOAT: usize = 8;
const SIZE_OF_REFERENCE_OVERHEAD: usize = 16;
const SIZE_OF_LIST_OVERHEAD: usize = 16;
const SIZE_OF_OBJECT_OVERHEAD: usize = 16;
const SIZE_OF_ERROR_OVERHEAD: usize = 16;
const SIZE_OF_RECORD_OVERHEAD: usize = 16;
const SIZE_OF_MUTATION_ID: usize = 16;

/// Default weigher: key length plus the estimated size of fields and metadata.
pub struct RecordWeigher;

impl RecordWeigher {
    /// Weight of a whole record in bytes.
    pub fn weigh(record: &Record) -> usize {
        let fields: usize = record
            .fields
            .iter()
            .map(|(name, value)| name.len() + Self::weigh_value(value))
            .sum();
        let metadata: usize = record
            .metadata
            .iter()
            .map(|(field, entries)| {
                field.len()
                    + entries
                        .iter()
                        .map(|(name, value)| name.len() + value.to_string().len())
                        .sum::<usize>()
            })
            .sum();
        let mutation = if record.mutation_id.is_some() {
            SIZE_OF_MUTATION_ID
        } else {
            0
        };
        SIZE_OF_RECORD_OVERHEAD + record.key.as_str().len() + fields + metadata + mutation
    }

    /// Weight of a single field value.
    pub fn weigh_value(value: &RecordValue) -> usize {
        match value {
            RecordValue::Null => SIZE_OF_NULL,
            RecordValue::Boolean(_) => SIZE_OF_BOOLEAN,
            RecordValue::Int(_) => SIZE_OF_INT,
            RecordValue::Float(_) => SIZE_OF_FLOAT,
            RecordValue::String(s) => s.len(),
            RecordValue::Reference(key) => SIZE_OF_REFERENCE_OVERHEAD + key.as_str().len(),
            RecordValue::List(items) => {
                SIZE_OF_LIST_OVERHEAD + items.iter().map(Self::weigh_value).sum::<usize>()
            }
            RecordValue::Object(map) => {
                SIZE_OF_OBJECT_OVERHEAD
                    + map
                        .iter()
                        .map(|(k, v)| k.len() + Self::weigh_value(v))
                        .sum::<usize>()
            }
            RecordValue::Error(error) => SIZE_OF_ERROR_OVERHEAD + error.message.len(),
        }
    }
}
