//! WDBC and WDB2 writers.

use bitstream::BitWriter;
use schema::TableSchema;
use tracing::trace;
use wire::{EncodeError, Generation, TableHeader};

use super::{dense_span, encode_rows, id_range, TableTemplate};
use crate::derive::u32_field;
use crate::error::{CodecError, CodecResult};
use crate::layout::TableLayout;
use crate::options::{TimestampPolicy, WriteOptions};
use crate::strings::StringTableBuilder;
use crate::value::Row;

pub(super) fn write(
    template: &TableTemplate,
    layout: &TableLayout,
    schema: &TableSchema,
    rows: &[Row],
    options: &WriteOptions,
) -> CodecResult<Vec<u8>> {
    let source = template.header();
    let generation = source.generation;
    let record_size: usize = layout
        .fields
        .iter()
        .map(|f| f.cardinality * f.value_type.byte_width())
        .sum();

    let ordered: Vec<&Row> = rows.iter().collect();
    let mut strings = StringTableBuilder::new();
    let encoded = encode_rows(
        layout,
        schema,
        &[],
        &mut strings,
        Some(record_size),
        options,
        &ordered,
    )?;

    let mut header = TableHeader::new(generation);
    header.record_count = u32_field("record count", rows.len())?;
    header.field_count = source.field_count;
    header.record_size = u32_field("record size", record_size)?;
    header.string_table_size = u32_field("string table size", strings.len())?;

    let mut index = Vec::new();
    let mut lengths = Vec::new();
    if generation == Generation::Wdb2 {
        header.table_hash = source.table_hash;
        header.build = source.build;
        header.locale = source.locale;
        header.timestamp = match options.timestamp {
            TimestampPolicy::Preserve => source.timestamp,
            TimestampPolicy::Refresh(now) => now,
        };
        if template.id_index_arrays {
            let (min_id, max_id) = id_range(rows.iter().map(|r| r.id));
            header.min_id = min_id;
            header.max_id = max_id;
            if max_id != 0 {
                let span = dense_span(min_id, max_id, rows.len())?;
                index = vec![0u32; span];
                lengths = vec![0u16; span];
                for (position, row) in encoded.iter().enumerate() {
                    let slot = (row.id - min_id) as usize;
                    index[slot] = u32_field("row position", position)?;
                    lengths[slot] = u16::try_from(row.string_bytes).map_err(|_| {
                        CodecError::Encode(EncodeError::ValueOverflow {
                            field: "row string length",
                            value: row.string_bytes as u64,
                        })
                    })?;
                }
                trace!(span, "id index");
            }
        }
    }

    let mut w = BitWriter::with_capacity(
        generation.header_size() + index.len() * 6 + rows.len() * record_size + strings.len(),
    );
    header.encode(&mut w)?;
    for position in &index {
        w.write_u32_aligned(*position)?;
    }
    for length in &lengths {
        w.write_u16_aligned(*length)?;
    }
    for row in &encoded {
        w.write_bytes(row.writer.as_bytes())?;
    }
    w.write_bytes(strings.as_bytes())?;
    Ok(w.finish())
}
