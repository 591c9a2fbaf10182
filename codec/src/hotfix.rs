//! Applying hotfix entries to materialized rows.
//!
//! A hotfix payload is one row with every stored column laid out in schema
//! order: scalars at their type's byte width, strings inline and
//! NUL-terminated, arrays element by element. The index column is not part
//! of the payload; the entry's record id carries it.

use bitstream::BitReader;
use schema::{TableSchema, ValueType};
use tracing::{debug, trace};

use crate::error::CodecResult;
use crate::layout::{Slot, TableLayout};
use crate::record::RecordSet;
use crate::value::{Row, Value};

/// One pushed change to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotfixEntry {
    pub push_id: i32,
    pub record_id: u32,
    pub table_hash: u32,
    /// `false` marks the record as removed.
    pub valid: bool,
    pub payload: Vec<u8>,
}

/// What an invalid entry does to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletionPolicy {
    /// Drop the row.
    #[default]
    Delete,
    /// Leave the row untouched.
    Keep,
}

/// Counts of what [`apply_hotfixes`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HotfixReport {
    pub replaced: usize,
    pub inserted: usize,
    pub deleted: usize,
    /// Entries for another table, or invalid entries kept by policy.
    pub skipped: usize,
}

/// Applies `entries` for `set`'s table to `rows`, in push order.
///
/// Valid entries with a payload replace the row with the same id or append
/// a new one; invalid entries remove the row under
/// [`DeletionPolicy::Delete`]. Entries for other tables are skipped.
pub fn apply_hotfixes(
    set: &RecordSet,
    schema: &TableSchema,
    rows: &mut Vec<Row>,
    entries: &[HotfixEntry],
    policy: DeletionPolicy,
) -> CodecResult<HotfixReport> {
    let layout = TableLayout::resolve(set.meta(), schema)?;
    let table_hash = set.header().table_hash;
    let mut ordered: Vec<&HotfixEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.push_id);

    let mut report = HotfixReport::default();
    for entry in ordered {
        if entry.table_hash != table_hash {
            report.skipped += 1;
            continue;
        }
        let existing = rows.iter().position(|r| r.id == entry.record_id);
        if !entry.valid {
            match (existing, policy) {
                (Some(position), DeletionPolicy::Delete) => {
                    rows.remove(position);
                    report.deleted += 1;
                }
                _ => report.skipped += 1,
            }
            continue;
        }
        if entry.payload.is_empty() {
            report.skipped += 1;
            continue;
        }
        let row = decode_payload(&layout, schema, entry.record_id, &entry.payload)?;
        trace!(push = entry.push_id, id = entry.record_id, "hotfix row");
        match existing {
            Some(position) => {
                rows[position] = row;
                report.replaced += 1;
            }
            None => {
                rows.push(row);
                report.inserted += 1;
            }
        }
    }
    debug!(
        table = %schema.name,
        replaced = report.replaced,
        inserted = report.inserted,
        deleted = report.deleted,
        skipped = report.skipped,
        "hotfixes applied"
    );
    Ok(report)
}

fn decode_payload(
    layout: &TableLayout,
    schema: &TableSchema,
    id: u32,
    payload: &[u8],
) -> CodecResult<Row> {
    let mut r = BitReader::new(payload);
    let mut values = Vec::with_capacity(schema.columns.len());
    for (position, (column, slot)) in schema.columns.iter().zip(&layout.slots).enumerate() {
        if layout.index_column == Some(position) {
            values.push(Value::from_raw(column.value_type, u64::from(id)));
            continue;
        }
        let value = match *slot {
            Slot::Id => Value::from_raw(column.value_type, u64::from(id)),
            Slot::Relation => scalar(&mut r, column.value_type)?,
            Slot::Field(field) => {
                let plan = &layout.fields[field];
                if plan.array {
                    let elements = (0..plan.cardinality)
                        .map(|_| scalar(&mut r, column.value_type))
                        .collect::<CodecResult<Vec<_>>>()?;
                    Value::Array(elements)
                } else {
                    scalar(&mut r, column.value_type)?
                }
            }
        };
        values.push(value);
    }
    Ok(Row::new(id, values))
}

fn scalar(r: &mut BitReader<'_>, value_type: ValueType) -> CodecResult<Value> {
    if value_type == ValueType::String {
        let bytes = r.read_cstring()?;
        return Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()));
    }
    let raw = r.read_bytes(value_type.byte_width())?;
    let mut buf = [0u8; 8];
    buf[..raw.len()].copy_from_slice(raw);
    Ok(Value::from_raw(value_type, u64::from_le_bytes(buf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{read_table, write_table, ReadOptions, TableTemplate, WriteOptions};
    use schema::ColumnDescriptor;
    use wire::Generation;

    fn schema() -> TableSchema {
        TableSchema::new(
            "Spell",
            vec![
                ColumnDescriptor::scalar("ID", ValueType::U32).index(),
                ColumnDescriptor::scalar("Name", ValueType::String),
                ColumnDescriptor::array("Effects", ValueType::U16, 2),
            ],
        )
        .unwrap()
    }

    fn row(id: u32, name: &str, effects: [u16; 2]) -> Row {
        Row::new(
            id,
            vec![
                Value::U32(id),
                Value::from(name),
                Value::Array(effects.iter().map(|e| Value::U16(*e)).collect()),
            ],
        )
    }

    fn payload(name: &str, effects: [u16; 2]) -> Vec<u8> {
        let mut bytes = name.as_bytes().to_vec();
        bytes.push(0);
        for e in effects {
            bytes.extend_from_slice(&e.to_le_bytes());
        }
        bytes
    }

    fn table(schema: &TableSchema) -> RecordSet {
        let template = TableTemplate::builder(Generation::Wdb2, schema)
            .table_hash(0xABCD)
            .build()
            .unwrap();
        let rows = vec![row(1, "a", [1, 2]), row(2, "b", [3, 4])];
        let bytes = write_table(&template, schema, &rows, &WriteOptions::default()).unwrap();
        read_table(bytes, &ReadOptions::default()).unwrap()
    }

    fn entry(push_id: i32, record_id: u32, valid: bool, payload: Vec<u8>) -> HotfixEntry {
        HotfixEntry {
            push_id,
            record_id,
            table_hash: 0xABCD,
            valid,
            payload,
        }
    }

    #[test]
    fn replaces_inserts_and_deletes() {
        let schema = schema();
        let set = table(&schema);
        let mut rows = set.rows(&schema).unwrap();
        let entries = vec![
            entry(3, 2, false, Vec::new()),
            entry(1, 1, true, payload("fixed", [9, 9])),
            entry(2, 7, true, payload("new", [0, 5])),
        ];
        let report =
            apply_hotfixes(&set, &schema, &mut rows, &entries, DeletionPolicy::Delete).unwrap();
        assert_eq!(
            report,
            HotfixReport {
                replaced: 1,
                inserted: 1,
                deleted: 1,
                skipped: 0
            }
        );
        assert_eq!(rows, vec![row(1, "fixed", [9, 9]), row(7, "new", [0, 5])]);
    }

    #[test]
    fn later_push_wins() {
        let schema = schema();
        let set = table(&schema);
        let mut rows = set.rows(&schema).unwrap();
        let entries = vec![
            entry(5, 1, true, payload("late", [0, 0])),
            entry(4, 1, true, payload("early", [0, 0])),
        ];
        apply_hotfixes(&set, &schema, &mut rows, &entries, DeletionPolicy::Delete).unwrap();
        assert_eq!(rows[0], row(1, "late", [0, 0]));
    }

    #[test]
    fn other_tables_and_kept_deletions_are_skipped() {
        let schema = schema();
        let set = table(&schema);
        let mut rows = set.rows(&schema).unwrap();
        let mut foreign = entry(1, 1, true, payload("x", [0, 0]));
        foreign.table_hash = 1;
        let entries = vec![foreign, entry(2, 2, false, Vec::new())];
        let report =
            apply_hotfixes(&set, &schema, &mut rows, &entries, DeletionPolicy::Keep).unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let schema = schema();
        let set = table(&schema);
        let mut rows = set.rows(&schema).unwrap();
        let entries = vec![entry(1, 1, true, b"name\0\x01".to_vec())];
        assert!(
            apply_hotfixes(&set, &schema, &mut rows, &entries, DeletionPolicy::Delete).is_err()
        );
    }
}
