//! WDB5 and WDB6 readers.

use std::collections::HashMap;

use bitstream::{BitReader, Value32};
use tracing::trace;
use wire::{
    region_slice, DecodeError, FieldMeta, Generation, LimitKind, Limits, Region, SectionHeader,
};

use super::{assign_ids, dense_records, fixed_records, id_span, Parts, Regions};
use crate::column::read_inline_id;
use crate::error::CodecResult;
use crate::layout::common_value_size;
use crate::record::{SectionInfo, TableMeta};
use crate::strings::StringBlock;

pub(super) fn read(data: &[u8], meta: &mut TableMeta, limits: &Limits) -> CodecResult<Parts> {
    let header = meta.header.clone();
    let mut regions = Regions::new(data, header.generation.header_size());
    meta.field_meta = regions.entries(
        header.field_count as usize,
        FieldMeta::SIZE,
        Region::FieldMeta,
        FieldMeta::decode,
    )?;

    let count = header.record_count as usize;
    limits.check(LimitKind::RecordCount, count)?;
    let start = regions.position();
    let mut section = SectionInfo {
        header: SectionHeader {
            file_offset: start as u32,
            record_count: header.record_count,
            ..SectionHeader::default()
        },
        ..SectionInfo::default()
    };
    let mut parts = Parts::default();

    let mut records = if header.flags.is_sparse() {
        // The string-size field holds the offset map's position instead.
        let map_offset = header.string_table_size as usize;
        let data_len = map_offset.checked_sub(start).ok_or(DecodeError::InvalidLayout {
            region: Region::OffsetMap,
            reason: "offset map overlaps field metadata",
        })?;
        regions.skip(data_len, Region::Records)?;
        let map = regions.offset_map(id_span(&header, limits)?)?;
        let records = dense_records(&map, header.min_id, 0);
        for record in &records {
            region_slice(data, record.offset, record.len, Region::Records)?;
        }
        trace!(entries = map.len(), records = records.len(), "sparse offset map");
        section.offset_map = map;
        section.records_len = data_len;
        records
    } else {
        let record_size = header.record_size as usize;
        let records_len = count.saturating_mul(record_size);
        regions.skip(records_len, Region::Records)?;
        let strings = regions.take(header.string_table_size as usize, Region::StringTable)?;
        section.header.string_table_size = header.string_table_size;
        section.records_len = records_len;
        section.string_table_len = strings.len();
        parts.strings = StringBlock::new(strings.to_vec());
        parts.records_len = records_len;
        fixed_records(start, count, record_size, 0, 0)
    };

    if header.flags.has_secondary_key() {
        let keys = regions.u32_list(count, Region::SecondaryKeys)?;
        for (record, key) in records.iter_mut().zip(keys) {
            record.secondary_key = key;
        }
    }

    if header.flags.has_index() {
        let ids = regions.u32_list(count, Region::IdList)?;
        assign_ids(&mut records, ids.iter().copied());
        section.id_list = ids;
    } else if !header.flags.is_sparse() {
        for record in &mut records {
            let bytes = region_slice(data, record.offset, record.len, Region::Records)?;
            let id = read_inline_id(meta, &[], bytes)?;
            record.id = id;
            record.source_id = id;
        }
    }

    section.copy_table = regions.copy_table(header.copy_table_size as usize / 8)?;

    if header.generation == Generation::Wdb6 {
        let block = regions.take(header.common_data_size as usize, Region::CommonData)?;
        let (types, maps) = read_common_block(block, limits)?;
        meta.common_types = types;
        parts.legacy_commons = maps;
    }

    parts.sections = vec![section];
    parts.records = records;
    Ok(parts)
}

/// Parses the WDB6 common block: per column a count, a type byte and
/// `{id, value}` entries.
fn read_common_block(
    block: &[u8],
    limits: &Limits,
) -> CodecResult<(Vec<u8>, Vec<HashMap<u32, Value32>>)> {
    if block.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let mut r = BitReader::new(block);
    let columns = r.read_u32_aligned()? as usize;
    limits.check(LimitKind::FieldCount, columns)?;

    let mut types = Vec::with_capacity(columns);
    let mut maps = Vec::with_capacity(columns);
    for _ in 0..columns {
        let count = r.read_u32_aligned()? as usize;
        let kind = r.read_u8_aligned()?;
        let size = common_value_size(kind).ok_or(DecodeError::InvalidLayout {
            region: Region::CommonData,
            reason: "unknown common value type",
        })?;
        limits.check(LimitKind::RecordCount, count)?;
        let mut map = HashMap::with_capacity(count);
        for _ in 0..count {
            let id = r.read_u32_aligned()?;
            let value = Value32::from_slice(r.read_bytes(size)?)?;
            map.insert(id, value);
        }
        types.push(kind);
        maps.push(map);
    }
    trace!(columns, "common block");
    Ok((types, maps))
}
