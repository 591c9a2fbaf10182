//! Per-generation writers.
//!
//! Every writer mirrors its reader: rows are serialized against a layout
//! resolved from the template, then regions are emitted in file order with
//! counts, sizes and offsets recomputed from what was written.

mod copies;
mod legacy;
mod template;
mod wdb;
mod wdc;

use std::collections::HashSet;

use bitstream::BitWriter;
use schema::TableSchema;
use tracing::debug;
use wire::{EncodeError, Generation, Limits, SparseEntry};

use crate::column::{EncodedRow, RowEncoder};
use crate::derive::{u16_field, u32_field, Pallet};
use crate::error::{CodecError, CodecResult, ValueReason};
use crate::layout::TableLayout;
use crate::options::WriteOptions;
use crate::strings::StringTableBuilder;
use crate::value::Row;

pub use template::{PreservedSection, RecordMeta, SectionTemplate, TableTemplate, TemplateBuilder};

/// Writes `rows` as a table shaped by `template`.
///
/// Row ids must be unique. Rows are written in the order given, except that
/// sparse tables indexed by a dense offset map are written in id order.
pub fn write_table(
    template: &TableTemplate,
    schema: &TableSchema,
    rows: &[Row],
    options: &WriteOptions,
) -> CodecResult<Vec<u8>> {
    let layout = TableLayout::resolve(&template.meta, schema)?;
    check_unique_ids(schema, rows)?;
    let generation = template.generation();
    debug!(
        generation = %generation,
        table = %schema.name,
        rows = rows.len(),
        collapse_copies = options.collapse_copies,
        "writing table"
    );

    let bytes = match generation {
        Generation::Wdbc | Generation::Wdb2 => {
            legacy::write(template, &layout, schema, rows, options)?
        }
        Generation::Wdb5 | Generation::Wdb6 => wdb::write(template, layout, schema, rows, options)?,
        Generation::Wdc1 => wdc::write_single(template, layout, schema, rows, options)?,
        Generation::Wdc2 | Generation::Wdc3 => {
            wdc::write_sections(template, layout, schema, rows, options)?
        }
    };
    debug!(bytes = bytes.len(), "table written");
    Ok(bytes)
}

fn check_unique_ids(schema: &TableSchema, rows: &[Row]) -> CodecResult<()> {
    let mut seen = HashSet::with_capacity(rows.len());
    match rows.iter().find(|row| !seen.insert(row.id)) {
        Some(row) => Err(CodecError::InvalidValue {
            column: schema
                .index_column()
                .map_or_else(|| schema.name.clone(), |i| schema.columns[i].name.clone()),
            row_id: row.id,
            reason: ValueReason::DuplicateId,
        }),
        None => Ok(()),
    }
}

/// Serializes `rows` in order.
pub(crate) fn encode_rows(
    layout: &TableLayout,
    schema: &TableSchema,
    pallets: &[Option<Pallet>],
    strings: &mut StringTableBuilder,
    record_size: Option<usize>,
    options: &WriteOptions,
    rows: &[&Row],
) -> CodecResult<Vec<EncodedRow>> {
    let mut encoder = RowEncoder {
        layout,
        schema,
        pallets,
        strings,
        record_size,
        sparse_alignment: options.sparse_row_alignment,
    };
    rows.iter().map(|row| encoder.encode(row)).collect()
}

/// Smallest and largest id; `(0, 0)` when there are none.
pub(crate) fn id_range(ids: impl IntoIterator<Item = u32>) -> (u32, u32) {
    ids.into_iter()
        .fold(None, |range, id| match range {
            None => Some((id, id)),
            Some((min, max)) => Some((id.min(min), id.max(max))),
        })
        .unwrap_or((0, 0))
}

/// Slots in a dense offset map covering `min..=max`; 0 for an empty table.
pub(crate) fn dense_span(min: u32, max: u32, records: usize) -> CodecResult<usize> {
    if records == 0 {
        return Ok(0);
    }
    let span = (max - min) as usize + 1;
    if span > Limits::default().max_records {
        return Err(CodecError::Encode(EncodeError::ValueOverflow {
            field: "id span",
            value: span as u64,
        }));
    }
    Ok(span)
}

/// Appends sparse records to `body`, returning their offset-map entries in
/// row order. `base` is the file offset of `body`'s first byte.
pub(crate) fn append_sparse(
    rows: &[EncodedRow],
    base: usize,
    body: &mut BitWriter,
) -> CodecResult<Vec<SparseEntry>> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        entries.push(SparseEntry {
            offset: u32_field("record offset", base + body.byte_len())?,
            size: u16_field("record size", row.writer.byte_len())?,
        });
        body.write_bytes(row.writer.as_bytes())?;
    }
    Ok(entries)
}

/// Appends sparse records and returns the dense offset map over
/// `min_id..min_id + span`.
pub(crate) fn dense_map(
    rows: &[EncodedRow],
    base: usize,
    min_id: u32,
    span: usize,
    body: &mut BitWriter,
) -> CodecResult<Vec<SparseEntry>> {
    let mut map = vec![SparseEntry::default(); span];
    for (row, entry) in rows.iter().zip(append_sparse(rows, base, body)?) {
        map[(row.id - min_id) as usize] = entry;
    }
    Ok(map)
}

/// Rows in id order.
pub(crate) fn sorted_by_id(rows: &[Row]) -> Vec<&Row> {
    let mut sorted: Vec<&Row> = rows.iter().collect();
    sorted.sort_by_key(|row| row.id);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use schema::{ColumnDescriptor, ValueType};

    #[test]
    fn id_range_of_nothing() {
        assert_eq!(id_range([]), (0, 0));
        assert_eq!(id_range([7, 3, 9]), (3, 9));
    }

    #[test]
    fn dense_span_bounds() {
        assert_eq!(dense_span(0, 0, 0).unwrap(), 0);
        assert_eq!(dense_span(100, 102, 2).unwrap(), 3);
        assert!(dense_span(0, u32::MAX, 2).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let schema = TableSchema::new(
            "T",
            vec![ColumnDescriptor::scalar("ID", ValueType::U32).index()],
        )
        .unwrap();
        let rows = vec![
            Row::new(1, vec![Value::U32(1)]),
            Row::new(1, vec![Value::U32(1)]),
        ];
        let err = check_unique_ids(&schema, &rows).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidValue {
                reason: ValueReason::DuplicateId,
                row_id: 1,
                ..
            }
        ));
    }
}
