//! WDC1, WDC2 and WDC3 writers.

use bitstream::BitWriter;
use schema::TableSchema;
use tracing::trace;
use wire::{
    ColumnMeta, CopyEntry, EncodeError, FieldMeta, Generation, RelationshipEntry,
    RelationshipMap, SectionHeader, SparseEntry, TableHeader,
};

use super::copies::{self, Collapsed};
use super::{
    append_sparse, dense_map, dense_span, encode_rows, id_range, sorted_by_id,
    PreservedSection, SectionTemplate, TableTemplate,
};
use crate::column::EncodedRow;
use crate::derive::{derive_columns, u16_field, u32_field, DerivedColumns};
use crate::error::{CodecError, CodecResult};
use crate::layout::{is_sparse, TableLayout};
use crate::options::WriteOptions;
use crate::strings::StringTableBuilder;
use crate::value::Row;

/// Header fields carried from the template unchanged.
fn carried_header(source: &TableHeader) -> TableHeader {
    let mut header = TableHeader::new(source.generation);
    header.table_hash = source.table_hash;
    header.layout_hash = source.layout_hash;
    header.locale = source.locale;
    header.flags = source.flags;
    header.id_index = source.id_index;
    header.lookup_column_count = source.lookup_column_count;
    header
}

/// Field meta: template widths at the derived byte offsets.
fn field_meta(template: &TableTemplate, derived: &DerivedColumns) -> CodecResult<Vec<FieldMeta>> {
    derived
        .column_meta
        .iter()
        .enumerate()
        .map(|(field, cm)| {
            let offset = u16_field("field offset", usize::from(cm.record_offset / 8))?;
            Ok(match template.meta.field_meta.get(field) {
                Some(fm) => FieldMeta {
                    bits: fm.bits,
                    offset,
                },
                None => FieldMeta::new(u32::from(cm.size).clamp(1, 32), offset),
            })
        })
        .collect()
}

/// Relationship map of `rows`, indexed by position; `None` when the schema
/// has no relation column.
fn relationship(layout: &TableLayout, rows: &[EncodedRow]) -> CodecResult<Option<RelationshipMap>> {
    if layout.relation_column.is_none() {
        return Ok(None);
    }
    let mut entries = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        if row.relation != 0 {
            entries.push(RelationshipEntry {
                foreign_id: row.relation,
                record_index: u32_field("relationship record index", index)?,
            });
        }
    }
    Ok(Some(RelationshipMap::from_entries(entries)))
}

fn collapse(
    layout: &TableLayout,
    source: &TableHeader,
    record_size: usize,
    options: &WriteOptions,
    rows: Vec<EncodedRow>,
) -> Collapsed {
    if copies::applies(layout, source, record_size, options) {
        copies::collapse(rows, copies::id_bits(layout))
    } else {
        Collapsed::keep_all(rows)
    }
}

fn write_column_regions(
    w: &mut BitWriter,
    column_meta: &[ColumnMeta],
    pallet: &[u8],
    common: &[u8],
) -> CodecResult<()> {
    for cm in column_meta {
        cm.encode(w)?;
    }
    w.write_bytes(pallet)?;
    w.write_bytes(common)?;
    Ok(())
}

/// WDC1: one implicit section.
pub(super) fn write_single(
    template: &TableTemplate,
    mut layout: TableLayout,
    schema: &TableSchema,
    rows: &[Row],
    options: &WriteOptions,
) -> CodecResult<Vec<u8>> {
    let source = template.header();
    let sparse = is_sparse(source);
    let derived = derive_columns(&mut layout, &template.meta.column_meta, schema, rows)?;
    let record_size = derived.record_size();
    let field_meta = field_meta(template, &derived)?;

    let ordered = if sparse {
        sorted_by_id(rows)
    } else {
        rows.iter().collect()
    };
    let mut strings = StringTableBuilder::new();
    let encoded = encode_rows(
        &layout,
        schema,
        &derived.pallets,
        &mut strings,
        (!sparse).then_some(record_size),
        options,
        &ordered,
    )?;
    let Collapsed { primaries, copies } = collapse(&layout, source, record_size, options, encoded);
    let relationship = relationship(&layout, &primaries)?;
    let pallet = derived.pallet_bytes();
    let common = derived.common_bytes();
    let (min_id, max_id) = id_range(rows.iter().map(|r| r.id));

    let mut header = carried_header(source);
    header.record_count = u32_field("record count", primaries.len())?;
    header.field_count = u32_field("field count", field_meta.len())?;
    header.total_field_count = header.field_count;
    header.record_size = u32_field("record size", record_size)?;
    header.min_id = min_id;
    header.max_id = max_id;
    header.copy_table_size = u32_field("copy table size", copies.len() * CopyEntry::SIZE)?;
    header.bitpacked_data_offset = derived.bitpacked_data_offset;
    header.field_storage_info_size =
        u32_field("field storage info size", derived.column_meta.len() * ColumnMeta::SIZE)?;
    header.common_data_size = u32_field("common data size", common.len())?;
    header.pallet_data_size = u32_field("pallet data size", pallet.len())?;

    let data_start = Generation::Wdc1.header_size() + field_meta.len() * FieldMeta::SIZE;
    let mut body = BitWriter::new();
    if sparse {
        let span = dense_span(min_id, max_id, primaries.len())?;
        let map = dense_map(&primaries, data_start, min_id, span, &mut body)?;
        header.offset_map_offset = u32_field("offset map offset", data_start + body.byte_len())?;
        for entry in map {
            entry.encode(&mut body)?;
        }
    } else {
        for row in &primaries {
            body.write_bytes(row.writer.as_bytes())?;
        }
        header.string_table_size = u32_field("string table size", strings.len())?;
        body.write_bytes(strings.as_bytes())?;
    }
    if header.flags.has_index() {
        header.id_list_size = u32_field("id list size", primaries.len() * 4)?;
        for row in &primaries {
            body.write_u32_aligned(row.id)?;
        }
    }
    for copy in &copies {
        copy.encode(&mut body)?;
    }
    write_column_regions(&mut body, &derived.column_meta, &pallet, &common)?;
    if let Some(map) = &relationship {
        header.relationship_data_size = u32_field("relationship data size", map.encoded_len())?;
        map.encode(&mut body)?;
    }

    let mut w = BitWriter::with_capacity(data_start + body.byte_len());
    header.encode(&mut w)?;
    for fm in &field_meta {
        fm.encode(&mut w)?;
    }
    w.write_bytes(body.as_bytes())?;
    Ok(w.finish())
}

/// Table-wide values every section block needs.
struct SectionContext<'a> {
    generation: Generation,
    sparse: bool,
    id_list: bool,
    layout: &'a TableLayout,
    record_size: usize,
    min_id: u32,
    span: usize,
    /// File offset of the first section block.
    base: usize,
}

/// WDC2 and WDC3: shared column regions, then one block per section.
pub(super) fn write_sections(
    template: &TableTemplate,
    mut layout: TableLayout,
    schema: &TableSchema,
    rows: &[Row],
    options: &WriteOptions,
) -> CodecResult<Vec<u8>> {
    let source = template.header();
    let generation = source.generation;
    let sparse = is_sparse(source);
    let derived = derive_columns(&mut layout, &template.meta.column_meta, schema, rows)?;
    let record_size = derived.record_size();
    let field_meta = field_meta(template, &derived)?;

    let fallback = [SectionTemplate::default()];
    let sections: &[SectionTemplate] = if template.sections.is_empty() {
        &fallback
    } else {
        &template.sections
    };

    let mut groups: Vec<Vec<&Row>> = vec![Vec::new(); sections.len()];
    if !rows.is_empty() {
        let first_plain = template
            .first_plain_section()
            .ok_or(CodecError::RoundTripMismatch {
                what: "plain sections",
                expected: 1,
                actual: 0,
            })?;
        for row in rows {
            groups[template.section_for(row.id, first_plain)].push(row);
        }
    }

    let mut strings = StringTableBuilder::new();
    let mut blocks = Vec::with_capacity(sections.len());
    for group in &mut groups {
        if sparse && generation == Generation::Wdc2 {
            group.sort_by_key(|row| row.id);
        }
        let encoded = encode_rows(
            &layout,
            schema,
            &derived.pallets,
            &mut strings,
            (!sparse).then_some(record_size),
            options,
            group,
        )?;
        blocks.push(collapse(&layout, source, record_size, options, encoded));
    }

    let mut ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
    let mut record_count = 0usize;
    for (section, block) in sections.iter().zip(&blocks) {
        match &section.preserved {
            Some(preserved) => {
                ids.extend(preserved_ids(preserved, generation, sparse));
                record_count += preserved.info.header.record_count as usize;
            }
            None => record_count += block.primaries.len(),
        }
    }
    let (min_id, max_id) = id_range(ids);

    // String tables: encrypted sections keep theirs, the first plain
    // section holds every written string.
    let first_plain = sections.iter().position(|s| s.preserved.is_none());
    let string_table = strings.into_bytes();
    let tables: Vec<&[u8]> = sections
        .iter()
        .enumerate()
        .map(|(index, section)| match &section.preserved {
            _ if sparse => &[][..],
            Some(preserved) => preserved.strings.as_slice(),
            None if Some(index) == first_plain => string_table.as_slice(),
            None => &[][..],
        })
        .collect();

    if !sparse {
        let region_lens: Vec<usize> = sections
            .iter()
            .zip(&blocks)
            .map(|(section, block)| match &section.preserved {
                Some(preserved) => preserved.info.header.record_count as usize * record_size,
                None => block.primaries.len() * record_size,
            })
            .collect();
        let records_len: usize = region_lens.iter().sum();
        let strings_base: usize = tables[..first_plain.unwrap_or(0)].iter().map(|t| t.len()).sum();
        let mut position = 0usize;
        for (block, len) in blocks.iter_mut().zip(&region_lens) {
            for (n, row) in block.primaries.iter_mut().enumerate() {
                patch_strings(row, position + n * record_size, strings_base, records_len)?;
            }
            position += len;
        }
    }

    let pallet = derived.pallet_bytes();
    let common = derived.common_bytes();
    let base = generation.header_size()
        + sections.len() * SectionHeader::size(generation)
        + field_meta.len() * FieldMeta::SIZE
        + derived.column_meta.len() * ColumnMeta::SIZE
        + pallet.len()
        + common.len();
    let ctx = SectionContext {
        generation,
        sparse,
        id_list: source.flags.has_index(),
        layout: &layout,
        record_size,
        min_id,
        span: dense_span(min_id, max_id, record_count)?,
        base,
    };

    let mut body = BitWriter::new();
    let mut section_headers = Vec::with_capacity(sections.len());
    let emitted = sections.iter().zip(&blocks).zip(&tables);
    for (index, ((section, block), table)) in emitted.enumerate() {
        let header = match &section.preserved {
            Some(preserved) => preserved_block(&ctx, preserved, table, &mut body)?,
            None => plain_block(&ctx, section.tact_key_hash, block, table, &mut body)?,
        };
        trace!(
            section = index,
            records = header.record_count,
            file_offset = header.file_offset,
            encrypted = section.preserved.is_some(),
            "section written"
        );
        section_headers.push(header);
    }

    let mut header = carried_header(source);
    header.record_count = u32_field("record count", record_count)?;
    header.field_count = u32_field("field count", field_meta.len())?;
    header.total_field_count = header.field_count;
    header.record_size = u32_field("record size", record_size)?;
    header.string_table_size = u32_field(
        "string table size",
        tables.iter().map(|t| t.len()).sum(),
    )?;
    header.min_id = min_id;
    header.max_id = max_id;
    header.bitpacked_data_offset = derived.bitpacked_data_offset;
    header.field_storage_info_size =
        u32_field("field storage info size", derived.column_meta.len() * ColumnMeta::SIZE)?;
    header.common_data_size = u32_field("common data size", common.len())?;
    header.pallet_data_size = u32_field("pallet data size", pallet.len())?;
    header.section_count = u32_field("section count", sections.len())?;

    let mut w = BitWriter::with_capacity(base + body.byte_len());
    header.encode(&mut w)?;
    for sh in &section_headers {
        sh.encode(&mut w, generation)?;
    }
    for fm in &field_meta {
        fm.encode(&mut w)?;
    }
    write_column_regions(&mut w, &derived.column_meta, &pallet, &common)?;
    w.write_bytes(body.as_bytes())?;
    Ok(w.finish())
}

/// Rewrites a row's string offsets relative to its field positions.
///
/// `position` is the row's byte position in the virtual record region,
/// `strings_base` where the written string table starts inside the
/// concatenated string tables.
fn patch_strings(
    row: &mut EncodedRow,
    position: usize,
    strings_base: usize,
    records_len: usize,
) -> CodecResult<()> {
    for &(bit, table_pos) in &row.string_refs {
        if table_pos == 0 {
            continue;
        }
        let target = records_len + strings_base + table_pos as usize;
        let stored = target - (position + bit / 8);
        row.writer
            .write_at(u64::from(u32_field("string offset", stored)?), 32, bit)?;
    }
    Ok(())
}

fn plain_block(
    ctx: &SectionContext<'_>,
    tact_key_hash: u64,
    block: &Collapsed,
    table: &[u8],
    body: &mut BitWriter,
) -> CodecResult<SectionHeader> {
    let rows = &block.primaries;
    let file_offset = ctx.base + body.byte_len();
    let mut sh = SectionHeader {
        tact_key_hash,
        file_offset: u32_field("section file offset", file_offset)?,
        record_count: u32_field("section record count", rows.len())?,
        ..SectionHeader::default()
    };

    let mut listed = Vec::new();
    if !ctx.sparse {
        for row in rows {
            body.write_bytes(row.writer.as_bytes())?;
        }
        sh.string_table_size = u32_field("section string table size", table.len())?;
        body.write_bytes(table)?;
    } else if ctx.generation == Generation::Wdc2 {
        let map = dense_map(rows, ctx.base, ctx.min_id, ctx.span, body)?;
        sh.offset_map_offset = u32_field("offset map offset", ctx.base + body.byte_len())?;
        for entry in map {
            entry.encode(body)?;
        }
    } else {
        listed = append_sparse(rows, ctx.base, body)?;
        sh.offset_records_end = u32_field("sparse records end", ctx.base + body.byte_len())?;
    }

    if ctx.id_list {
        sh.id_list_size = u32_field("id list size", rows.len() * 4)?;
        for row in rows {
            body.write_u32_aligned(row.id)?;
        }
    }
    write_copies(ctx, &mut sh, &block.copies, body)?;
    if ctx.generation == Generation::Wdc3 {
        sh.offset_map_id_count = u32_field("offset map entries", listed.len())?;
        for entry in &listed {
            entry.encode(body)?;
        }
    }
    if let Some(map) = relationship(ctx.layout, rows)? {
        sh.relationship_data_size = u32_field("relationship data size", map.encoded_len())?;
        map.encode(body)?;
    }
    if !listed.is_empty() {
        for row in rows {
            body.write_u32_aligned(row.id)?;
        }
    }
    Ok(sh)
}

fn write_copies(
    ctx: &SectionContext<'_>,
    sh: &mut SectionHeader,
    copies: &[CopyEntry],
    body: &mut BitWriter,
) -> CodecResult<()> {
    if ctx.generation == Generation::Wdc3 {
        sh.copy_table_count = u32_field("copy table entries", copies.len())?;
    } else {
        sh.copy_table_size = u32_field("copy table size", copies.len() * CopyEntry::SIZE)?;
    }
    for copy in copies {
        copy.encode(body)?;
    }
    Ok(())
}

/// Ids an encrypted section still claims.
fn preserved_ids(
    preserved: &PreservedSection,
    generation: Generation,
    sparse: bool,
) -> Vec<u32> {
    let info = &preserved.info;
    let mut ids = info.id_list.clone();
    ids.extend(&info.sparse_ids);
    ids.extend(info.copy_table.iter().map(|c| c.new_id));
    if sparse && generation == Generation::Wdc2 {
        ids.extend(
            info.offset_map
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.is_empty())
                .map(|(pos, _)| preserved.min_id.wrapping_add(pos as u32)),
        );
    }
    ids
}

fn relocate(entry: SparseEntry, delta: i64) -> CodecResult<SparseEntry> {
    if entry.is_empty() {
        return Ok(entry);
    }
    let moved = i64::from(entry.offset) + delta;
    let offset = u32::try_from(moved).map_err(|_| {
        CodecError::Encode(EncodeError::ValueOverflow {
            field: "relocated record offset",
            value: moved.unsigned_abs(),
        })
    })?;
    Ok(SparseEntry { offset, ..entry })
}

/// Re-emits an encrypted section: zeroed records of the same count, its
/// string table and every list stored beside it.
fn preserved_block(
    ctx: &SectionContext<'_>,
    preserved: &PreservedSection,
    table: &[u8],
    body: &mut BitWriter,
) -> CodecResult<SectionHeader> {
    let info = &preserved.info;
    let file_offset = ctx.base + body.byte_len();
    let delta = file_offset as i64 - i64::from(info.header.file_offset);
    let mut sh = SectionHeader {
        tact_key_hash: info.header.tact_key_hash,
        file_offset: u32_field("section file offset", file_offset)?,
        record_count: info.header.record_count,
        ..SectionHeader::default()
    };

    let records_len = if ctx.sparse {
        info.records_len
    } else {
        info.header.record_count as usize * ctx.record_size
    };
    body.write_bytes(&vec![0; records_len])?;
    if ctx.sparse {
        if ctx.generation == Generation::Wdc2 {
            sh.offset_map_offset = u32_field("offset map offset", ctx.base + body.byte_len())?;
            let mut map = vec![SparseEntry::default(); ctx.span];
            for (pos, entry) in info.offset_map.iter().enumerate() {
                if entry.is_empty() {
                    continue;
                }
                let id = preserved.min_id.wrapping_add(pos as u32);
                let slot = id
                    .checked_sub(ctx.min_id)
                    .and_then(|s| map.get_mut(s as usize));
                if let Some(slot) = slot {
                    *slot = relocate(*entry, delta)?;
                }
            }
            for entry in map {
                entry.encode(body)?;
            }
        } else {
            sh.offset_records_end = u32_field("sparse records end", ctx.base + body.byte_len())?;
        }
    } else {
        sh.string_table_size = u32_field("section string table size", table.len())?;
        body.write_bytes(table)?;
    }

    sh.id_list_size = u32_field("id list size", info.id_list.len() * 4)?;
    for id in &info.id_list {
        body.write_u32_aligned(*id)?;
    }
    write_copies(ctx, &mut sh, &info.copy_table, body)?;
    if ctx.generation == Generation::Wdc3 {
        sh.offset_map_id_count = u32_field("offset map entries", info.offset_map.len())?;
        for entry in &info.offset_map {
            relocate(*entry, delta)?.encode(body)?;
        }
    }
    if let Some(map) = &info.relationship {
        sh.relationship_data_size = u32_field("relationship data size", map.encoded_len())?;
        map.encode(body)?;
    }
    if ctx.generation == Generation::Wdc3 {
        for pos in 0..info.offset_map.len() {
            body.write_u32_aligned(info.sparse_ids.get(pos).copied().unwrap_or(0))?;
        }
    }
    Ok(sh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocation_keeps_holes() {
        let hole = SparseEntry::default();
        assert_eq!(relocate(hole, 40).unwrap(), hole);
        let entry = SparseEntry {
            offset: 100,
            size: 6,
        };
        assert_eq!(relocate(entry, -40).unwrap().offset, 60);
        assert!(relocate(entry, -200).is_err());
    }

    #[test]
    fn patched_offsets_point_past_the_records() {
        let mut writer = BitWriter::new();
        writer.write_u32_aligned(0).unwrap();
        writer.write_u32_aligned(5).unwrap();
        let mut row = EncodedRow {
            id: 1,
            writer,
            string_refs: vec![(32, 5)],
            string_bytes: 3,
            extra: Vec::new(),
            relation: 0,
        };
        // Second record of a 16-byte region, table starting at 2.
        patch_strings(&mut row, 8, 2, 16).unwrap();
        let bytes = row.writer.as_bytes();
        let stored = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        // stored + field position - records_len == strings_base + table_pos
        assert_eq!(stored as usize + 12 - 16, 2 + 5);
    }
}
