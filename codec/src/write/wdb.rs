//! WDB5 and WDB6 writers.

use bitstream::{BitWriter, Value32};
use schema::{TableSchema, ValueType};
use tracing::trace;
use wire::{CopyEntry, FieldMeta, Generation, TableHeader};

use super::copies::{self, Collapsed};
use super::{dense_map, dense_span, encode_rows, id_range, sorted_by_id, TableTemplate};
use crate::column::{elements, fixed_elements};
use crate::derive::{u16_field, u32_field};
use crate::error::{CodecError, CodecResult, UnsupportedReason, ValueReason};
use crate::layout::{common_value_size, is_sparse, Storage, TableLayout, COMMON_TYPE_INT};
use crate::options::WriteOptions;
use crate::strings::StringTableBuilder;
use crate::value::{Row, Value};

pub(super) fn write(
    template: &TableTemplate,
    mut layout: TableLayout,
    schema: &TableSchema,
    rows: &[Row],
    options: &WriteOptions,
) -> CodecResult<Vec<u8>> {
    let source = template.header();
    let generation = source.generation;
    let sparse = is_sparse(source);
    let field_count = source.field_count as usize;

    // Template widths, laid out back to back.
    let mut field_meta = Vec::with_capacity(field_count);
    let mut offset = 0usize;
    for (field, plan) in layout.fields.iter_mut().enumerate().take(field_count) {
        let width = template
            .meta
            .field_meta
            .get(field)
            .map_or(plan.element_bits, |fm| fm.width_bits());
        field_meta.push(FieldMeta::new(width, u16_field("field offset", offset)?));
        if !sparse {
            plan.bit_position = Some(offset * 8);
        }
        offset += (plan.element_bits as usize).div_ceil(8) * plan.cardinality;
    }
    let record_size = offset.max(source.record_size as usize);

    let ordered = if sparse {
        sorted_by_id(rows)
    } else {
        rows.iter().collect()
    };
    let mut strings = StringTableBuilder::new();
    let encoded = encode_rows(
        &layout,
        schema,
        &[],
        &mut strings,
        (!sparse).then_some(record_size),
        options,
        &ordered,
    )?;
    let common_block = if generation == Generation::Wdb6 {
        common_block(template, &layout, schema, &ordered, &mut strings, sparse)?
    } else {
        Vec::new()
    };

    let collapse = copies::applies(&layout, source, record_size, options);
    let Collapsed { primaries, copies } = if collapse {
        copies::collapse(encoded, copies::id_bits(&layout))
    } else {
        Collapsed::keep_all(encoded)
    };

    let (min_id, max_id) = id_range(rows.iter().map(|r| r.id));
    let mut header = TableHeader::new(generation);
    header.record_count = u32_field("record count", primaries.len())?;
    header.field_count = source.field_count;
    header.record_size = u32_field("record size", record_size)?;
    header.table_hash = source.table_hash;
    header.layout_hash = source.layout_hash;
    header.min_id = min_id;
    header.max_id = max_id;
    header.locale = source.locale;
    header.copy_table_size = u32_field("copy table size", copies.len() * CopyEntry::SIZE)?;
    header.flags = source.flags;
    header.id_index = source.id_index;
    if generation == Generation::Wdb6 {
        header.total_field_count = source.total_field_count;
        header.common_data_size = u32_field("common data size", common_block.len())?;
    }

    let data_start = generation.header_size() + field_meta.len() * FieldMeta::SIZE;
    let mut body = BitWriter::new();
    if sparse {
        let span = dense_span(min_id, max_id, primaries.len())?;
        let map = dense_map(&primaries, data_start, min_id, span, &mut body)?;
        header.string_table_size = u32_field("offset map offset", data_start + body.byte_len())?;
        for entry in map {
            entry.encode(&mut body)?;
        }
        trace!(span, records = primaries.len(), "sparse records");
    } else {
        for row in &primaries {
            body.write_bytes(row.writer.as_bytes())?;
        }
        header.string_table_size = u32_field("string table size", strings.len())?;
        body.write_bytes(strings.as_bytes())?;
    }

    let mut w = BitWriter::with_capacity(data_start + body.byte_len());
    header.encode(&mut w)?;
    for fm in &field_meta {
        fm.encode(&mut w)?;
    }
    w.write_bytes(body.as_bytes())?;
    if header.flags.has_secondary_key() {
        for row in &primaries {
            w.write_u32_aligned(template.secondary_key(row.id))?;
        }
    }
    if header.flags.has_index() {
        for row in &primaries {
            w.write_u32_aligned(row.id)?;
        }
    }
    for copy in &copies {
        copy.encode(&mut w)?;
    }
    w.write_bytes(&common_block)?;
    Ok(w.finish())
}

/// The WDB6 common block: every field in order, with `{id, value}` entries
/// for the out-of-record ones. Zero values and empty strings are omitted.
fn common_block(
    template: &TableTemplate,
    layout: &TableLayout,
    schema: &TableSchema,
    rows: &[&Row],
    strings: &mut StringTableBuilder,
    sparse: bool,
) -> CodecResult<Vec<u8>> {
    let source = template.header();
    let total = source.total_field_count as usize;
    if total <= source.field_count as usize && source.common_data_size == 0 {
        return Ok(Vec::new());
    }

    let mut w = BitWriter::new();
    w.write_u32_aligned(u32_field("common column count", total)?)?;
    for field in 0..total {
        let plan = layout.fields.get(field);
        let kind = match plan.map(|p| p.storage) {
            Some(Storage::LegacyCommon { kind }) => kind,
            _ => template
                .meta
                .common_types
                .get(field)
                .copied()
                .unwrap_or(COMMON_TYPE_INT),
        };
        let size = common_value_size(kind).ok_or_else(|| CodecError::InvalidValue {
            column: plan.map_or_else(
                || schema.name.clone(),
                |p| schema.columns[p.column].name.clone(),
            ),
            row_id: 0,
            reason: ValueReason::UnknownCommonType { raw: kind },
        })?;

        let mut entries = Vec::new();
        if let Some(plan) = plan.filter(|p| matches!(p.storage, Storage::LegacyCommon { .. })) {
            // Sparse files have no string table for common strings to point into.
            if sparse && plan.value_type == ValueType::String {
                return Err(CodecError::UnsupportedColumn {
                    column: schema.columns[plan.column].name.clone(),
                    value_type: plan.value_type,
                    kind: plan.storage.kind(),
                    reason: UnsupportedReason::StringCompressed,
                });
            }
            for row in rows {
                let value = &row.values[plan.column];
                let stored = if plan.value_type == ValueType::String {
                    match elements(schema, plan, row.id, value)?.first() {
                        Some(Value::String(s)) if !s.is_empty() => {
                            Value32::from_u32(strings.intern(s)?)
                        }
                        _ => continue,
                    }
                } else {
                    match fixed_elements(schema, plan, row.id, value)?.first() {
                        Some(fixed) if !fixed.is_zero() => *fixed,
                        _ => continue,
                    }
                };
                entries.push((row.id, stored));
            }
        }

        w.write_u32_aligned(u32_field("common entry count", entries.len())?)?;
        w.write_u8_aligned(kind)?;
        for (id, value) in entries {
            w.write_u32_aligned(id)?;
            w.write_bytes(value.bytes(size))?;
        }
    }
    Ok(w.finish())
}
