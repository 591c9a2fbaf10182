//! WDC1, WDC2 and WDC3 readers.

use bitstream::{BitReader, Value32};
use tracing::trace;
use wire::{
    region_slice, ColumnMeta, DecodeError, FieldMeta, Generation, LimitKind, Limits, Region,
    SectionHeader, SparseEntry, WireResult,
};

use super::{
    assign_ids, attach_relations, column_data, dense_records, fixed_records, id_span,
    is_encrypted, warn_encrypted, Parts, Regions,
};
use crate::column::read_inline_id;
use crate::error::CodecResult;
use crate::record::{RawRecord, SectionInfo, TableMeta};
use crate::strings::StringBlock;

/// WDC1: one implicit section, column metadata after the records.
pub(super) fn read_single(
    data: &[u8],
    meta: &mut TableMeta,
    limits: &Limits,
) -> CodecResult<Parts> {
    let header = meta.header.clone();
    let mut regions = Regions::new(data, header.generation.header_size());
    meta.field_meta = regions.entries(
        header.field_count as usize,
        FieldMeta::SIZE,
        Region::FieldMeta,
        FieldMeta::decode,
    )?;

    let count = header.record_count as usize;
    let start = regions.position();
    let sparse = header.flags.is_sparse();
    let mut section = SectionInfo {
        header: SectionHeader {
            file_offset: start as u32,
            record_count: header.record_count,
            ..SectionHeader::default()
        },
        ..SectionInfo::default()
    };
    let mut parts = Parts::default();

    let mut records = if sparse {
        let map_offset = header.offset_map_offset as usize;
        let data_len = map_offset.checked_sub(start).ok_or(DecodeError::InvalidLayout {
            region: Region::OffsetMap,
            reason: "offset map overlaps field metadata",
        })?;
        regions.skip(data_len, Region::Records)?;
        section.offset_map = regions.offset_map(id_span(&header, limits)?)?;
        section.header.offset_map_offset = header.offset_map_offset;
        section.records_len = data_len;
        dense_records(&section.offset_map, header.min_id, 0)
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

    let ids = regions.u32_list(header.id_list_size as usize / 4, Region::IdList)?;
    section.copy_table = regions.copy_table(header.copy_table_size as usize / 8)?;
    meta.column_meta = column_meta(&mut regions, header.field_storage_info_size, limits)?;
    let pallet = regions.take(header.pallet_data_size as usize, Region::PalletData)?;
    let common = regions.take(header.common_data_size as usize, Region::CommonData)?;
    let (pallets, commons) = column_data(meta, pallet, common)?;
    section.relationship = regions.relationship(header.relationship_data_size as usize)?;

    check_bounds(data, &records)?;
    resolve_ids(data, meta, &pallets, &mut records, &ids, sparse)?;
    attach_relations(&mut records, section.relationship.as_ref());
    section.header.id_list_size = header.id_list_size;
    section.header.copy_table_size = header.copy_table_size;
    section.header.relationship_data_size = header.relationship_data_size;
    section.id_list = ids;

    parts.pallets = pallets;
    parts.commons = commons;
    parts.sections = vec![section];
    parts.records = records;
    Ok(parts)
}

/// WDC2 and WDC3: shared column regions up front, then one block per section.
pub(super) fn read_sections(
    data: &[u8],
    meta: &mut TableMeta,
    limits: &Limits,
) -> CodecResult<Parts> {
    let header = meta.header.clone();
    let generation = header.generation;
    limits.check(LimitKind::SectionCount, header.section_count as usize)?;

    let mut regions = Regions::new(data, generation.header_size());
    let section_headers = regions.entries(
        header.section_count as usize,
        SectionHeader::size(generation),
        Region::SectionHeaders,
        |r| SectionHeader::decode(r, generation),
    )?;
    meta.field_meta = regions.entries(
        header.field_count as usize,
        FieldMeta::SIZE,
        Region::FieldMeta,
        FieldMeta::decode,
    )?;
    meta.column_meta = column_meta(&mut regions, header.field_storage_info_size, limits)?;
    let pallet = regions.take(header.pallet_data_size as usize, Region::PalletData)?;
    let common = regions.take(header.common_data_size as usize, Region::CommonData)?;
    let (pallets, commons) = column_data(meta, pallet, common)?;

    let sparse = header.flags.is_sparse();
    let record_size = header.record_size as usize;
    let mut strings = StringBlock::default();
    let mut region_base = 0usize;
    let mut sections = Vec::with_capacity(section_headers.len());
    let mut records = Vec::new();

    for (index, sh) in section_headers.into_iter().enumerate() {
        let count = sh.record_count as usize;
        limits.check(LimitKind::RecordCount, count)?;
        regions.seek(sh.file_offset as usize);
        let start = regions.position();
        let mut info = SectionInfo {
            header: sh,
            ..SectionInfo::default()
        };

        let record_bytes = if sparse {
            let end = match generation {
                Generation::Wdc3 => sh.offset_records_end,
                _ => sh.offset_map_offset,
            } as usize;
            let len = end.checked_sub(start).ok_or(DecodeError::InvalidLayout {
                region: Region::Records,
                reason: "sparse data ends before its section starts",
            })?;
            let bytes = regions.take(len, Region::Records)?;
            if generation == Generation::Wdc2 {
                info.offset_map = regions.offset_map(id_span(&header, limits)?)?;
            }
            bytes
        } else {
            let bytes = regions.take(count.saturating_mul(record_size), Region::Records)?;
            let table = regions.take(sh.string_table_size as usize, Region::StringTable)?;
            strings.push_table(table);
            info.string_table_len = table.len();
            bytes
        };
        info.records_len = record_bytes.len();

        let ids = regions.u32_list(sh.id_list_size as usize / 4, Region::IdList)?;
        let copies = match generation {
            Generation::Wdc3 => sh.copy_table_count as usize,
            _ => sh.copy_table_size as usize / 8,
        };
        info.copy_table = regions.copy_table(copies)?;
        if generation == Generation::Wdc3 {
            info.offset_map = regions.offset_map(sh.offset_map_id_count as usize)?;
        }
        info.relationship = regions.relationship(sh.relationship_data_size as usize)?;
        if generation == Generation::Wdc3 && sh.offset_map_id_count > 0 {
            info.sparse_ids = regions.u32_list(sh.offset_map_id_count as usize, Region::IdList)?;
        }

        info.encrypted = is_encrypted(sh.tact_key_hash, record_bytes);
        if info.encrypted {
            warn_encrypted(index, sh.tact_key_hash, sh.record_count);
        } else {
            let mut located = if !sparse {
                fixed_records(start, count, record_size, index, region_base)
            } else if generation == Generation::Wdc2 {
                dense_records(&info.offset_map, header.min_id, index)
            } else {
                listed_records(&info.offset_map, index)
            };
            check_bounds(data, &located)?;
            if ids.is_empty() && !info.sparse_ids.is_empty() {
                assign_ids(&mut located, info.sparse_ids.iter().copied());
            } else {
                resolve_ids(data, meta, &pallets, &mut located, &ids, sparse)?;
            }
            attach_relations(&mut located, info.relationship.as_ref());
            trace!(
                section = index,
                records = located.len(),
                copies = info.copy_table.len(),
                strings = info.string_table_len,
                "section read"
            );
            records.extend(located);
        }
        info.id_list = ids;
        region_base += info.records_len;
        sections.push(info);
    }

    // Relative string offsets count from the start of the virtual record
    // region, so only the fixed-record bytes take part.
    let records_len = if sparse { 0 } else { region_base };
    Ok(Parts {
        strings,
        records_len,
        pallets,
        commons,
        legacy_commons: Vec::new(),
        sections,
        records,
    })
}

fn column_meta(
    regions: &mut Regions<'_>,
    size: u32,
    limits: &Limits,
) -> WireResult<Vec<ColumnMeta>> {
    let count = size as usize / ColumnMeta::SIZE;
    limits.check(LimitKind::FieldCount, count)?;
    let mut r = BitReader::new(regions.take(count * ColumnMeta::SIZE, Region::ColumnMeta)?);
    (0..count).map(|column| ColumnMeta::decode(&mut r, column)).collect()
}

/// WDC3 sparse records: one per offset-map entry, ids assigned afterwards.
fn listed_records(map: &[SparseEntry], section: usize) -> Vec<RawRecord> {
    map.iter()
        .map(|e| RawRecord {
            id: 0,
            source_id: 0,
            offset: e.offset as usize,
            len: usize::from(e.size),
            section,
            region_position: 0,
            relation: None,
            secondary_key: 0,
        })
        .collect()
}

fn check_bounds(data: &[u8], records: &[RawRecord]) -> WireResult<()> {
    for record in records {
        region_slice(data, record.offset, record.len, Region::Records)?;
    }
    Ok(())
}

/// Id list first; otherwise dense sparse ids stay, fixed records read the
/// inline id field.
fn resolve_ids(
    data: &[u8],
    meta: &TableMeta,
    pallets: &[Vec<Value32>],
    records: &mut [RawRecord],
    ids: &[u32],
    sparse: bool,
) -> CodecResult<()> {
    if !ids.is_empty() {
        assign_ids(records, ids.iter().copied());
    } else if !sparse {
        for record in records.iter_mut() {
            let bytes = region_slice(data, record.offset, record.len, Region::Records)?;
            let id = read_inline_id(meta, pallets, bytes)?;
            record.id = id;
            record.source_id = id;
        }
    }
    Ok(())
}
