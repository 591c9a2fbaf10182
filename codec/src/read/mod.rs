//! Per-generation readers.
//!
//! Each reader walks its generation's regions in file order and produces
//! located records plus the tables stored beside them. The shared tail
//! expands copy rows and assembles the [`RecordSet`].

mod legacy;
mod wdb;
mod wdc;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bitstream::{BitReader, Value32};
use tracing::{debug, warn};
use wire::{
    region_slice, ColumnCompression, CopyEntry, DecodeError, Generation, LimitKind, Limits,
    Region, RelationshipMap, SparseEntry, TableHeader, WireResult,
};

use crate::error::{CodecError, CodecResult, CopyReason};
use crate::options::ReadOptions;
use crate::record::{RawRecord, RecordSet, SectionInfo, TableMeta};
use crate::strings::StringBlock;

/// Everything a generation reader extracts before copy expansion.
#[derive(Debug, Default)]
pub(crate) struct Parts {
    pub strings: StringBlock,
    pub records_len: usize,
    pub pallets: Vec<Vec<Value32>>,
    pub commons: Vec<HashMap<u32, Value32>>,
    pub legacy_commons: Vec<HashMap<u32, Value32>>,
    pub sections: Vec<SectionInfo>,
    pub records: Vec<RawRecord>,
}

/// Reads a table from its bytes.
pub fn read_table(bytes: impl Into<Arc<[u8]>>, options: &ReadOptions) -> CodecResult<RecordSet> {
    let data: Arc<[u8]> = bytes.into();
    let header = TableHeader::decode(&data)?;
    let limits = &options.limits;
    limits.check(LimitKind::FieldCount, header.field_count as usize)?;
    limits.check(LimitKind::FieldCount, header.total_field_count as usize)?;
    limits.check(LimitKind::RecordCount, header.record_count as usize)?;
    debug!(
        generation = %header.generation,
        records = header.record_count,
        fields = header.field_count,
        flags = header.flags.raw(),
        "opening table"
    );

    let generation = header.generation;
    let mut meta = TableMeta::new(header);
    let parts = match generation {
        Generation::Wdbc | Generation::Wdb2 => legacy::read(&data, &meta, limits)?,
        Generation::Wdb5 | Generation::Wdb6 => wdb::read(&data, &mut meta, limits)?,
        Generation::Wdc1 => wdc::read_single(&data, &mut meta, limits)?,
        Generation::Wdc2 | Generation::Wdc3 => wdc::read_sections(&data, &mut meta, limits)?,
    };
    assemble(data, meta, parts, options)
}

fn assemble(
    data: Arc<[u8]>,
    meta: TableMeta,
    mut parts: Parts,
    options: &ReadOptions,
) -> CodecResult<RecordSet> {
    expand_copies(&mut parts)?;
    options.limits.check(LimitKind::RecordCount, parts.records.len())?;
    debug!(
        records = parts.records.len(),
        sections = parts.sections.len(),
        encrypted = parts.sections.iter().filter(|s| s.encrypted).count(),
        "table located"
    );
    Ok(RecordSet {
        meta,
        data,
        strings: parts.strings,
        records_len: parts.records_len,
        pallets: parts.pallets,
        commons: parts.commons,
        legacy_commons: parts.legacy_commons,
        sections: parts.sections,
        records: parts.records,
        parallel_threshold: options.parallel_threshold,
    })
}

/// Appends one row per copy-table entry of every plain section.
fn expand_copies(parts: &mut Parts) -> CodecResult<()> {
    let primary: HashMap<u32, usize> = parts
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id, i))
        .collect();
    let copy_ids: HashSet<u32> = parts
        .sections
        .iter()
        .filter(|s| !s.encrypted)
        .flat_map(|s| s.copy_table.iter().map(|c| c.new_id))
        .collect();

    let mut copies = Vec::new();
    for (section, info) in parts.sections.iter().enumerate() {
        if info.encrypted {
            continue;
        }
        for entry in &info.copy_table {
            let Some(&source) = primary.get(&entry.source_id) else {
                let reason = if copy_ids.contains(&entry.source_id) {
                    CopyReason::SourceIsCopy
                } else {
                    CopyReason::MissingSource
                };
                return Err(CodecError::InvalidCopy {
                    new_id: entry.new_id,
                    source_id: entry.source_id,
                    reason,
                });
            };
            copies.push(RawRecord {
                id: entry.new_id,
                section,
                ..parts.records[source]
            });
        }
    }
    parts.records.extend(copies);
    Ok(())
}

/// Sequential walker over a file's regions.
pub(crate) struct Regions<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Regions<'a> {
    pub(crate) const fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub(crate) const fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub(crate) fn take(&mut self, len: usize, region: Region) -> WireResult<&'a [u8]> {
        let slice = region_slice(self.data, self.pos, len, region)?;
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize, region: Region) -> WireResult<()> {
        self.take(len, region).map(|_| ())
    }

    /// Decodes `count` fixed-size entries.
    pub(crate) fn entries<T>(
        &mut self,
        count: usize,
        size: usize,
        region: Region,
        decode: impl Fn(&mut BitReader<'a>) -> WireResult<T>,
    ) -> WireResult<Vec<T>> {
        let len = count.checked_mul(size).ok_or(DecodeError::Truncated {
            region,
            needed: usize::MAX,
            available: self.data.len(),
        })?;
        let mut r = BitReader::new(self.take(len, region)?);
        (0..count).map(|_| decode(&mut r)).collect()
    }

    pub(crate) fn u32_list(&mut self, count: usize, region: Region) -> WireResult<Vec<u32>> {
        self.entries(count, 4, region, |r| Ok(r.read_u32_aligned()?))
    }

    pub(crate) fn copy_table(&mut self, count: usize) -> WireResult<Vec<CopyEntry>> {
        self.entries(count, CopyEntry::SIZE, Region::CopyTable, CopyEntry::decode)
    }

    pub(crate) fn offset_map(&mut self, count: usize) -> WireResult<Vec<SparseEntry>> {
        self.entries(count, SparseEntry::SIZE, Region::OffsetMap, SparseEntry::decode)
    }

    pub(crate) fn relationship(&mut self, len: usize) -> WireResult<Option<RelationshipMap>> {
        if len == 0 {
            return Ok(None);
        }
        let bytes = self.take(len, Region::RelationshipMap)?;
        RelationshipMap::decode(&mut BitReader::new(bytes)).map(Some)
    }
}

/// Number of slots in a dense sparse index.
pub(crate) fn id_span(header: &TableHeader, limits: &Limits) -> WireResult<usize> {
    if header.record_count == 0 {
        return Ok(0);
    }
    let span = header
        .max_id
        .checked_sub(header.min_id)
        .ok_or(DecodeError::InvalidLayout {
            region: Region::Header,
            reason: "max id below min id",
        })? as usize
        + 1;
    limits.check(LimitKind::RecordCount, span)?;
    Ok(span)
}

/// Records of a dense offset map, in id order.
pub(crate) fn dense_records(map: &[SparseEntry], min_id: u32, section: usize) -> Vec<RawRecord> {
    map.iter()
        .enumerate()
        .filter(|(_, e)| !e.is_empty())
        .map(|(pos, e)| RawRecord {
            id: min_id.wrapping_add(pos as u32),
            source_id: min_id.wrapping_add(pos as u32),
            offset: e.offset as usize,
            len: usize::from(e.size),
            section,
            region_position: 0,
            relation: None,
            secondary_key: 0,
        })
        .collect()
}

/// Fixed-size records laid end to end.
pub(crate) fn fixed_records(
    start: usize,
    count: usize,
    record_size: usize,
    section: usize,
    region_base: usize,
) -> Vec<RawRecord> {
    (0..count)
        .map(|i| RawRecord {
            id: i as u32,
            source_id: i as u32,
            offset: start + i * record_size,
            len: record_size,
            section,
            region_position: region_base + i * record_size,
            relation: None,
            secondary_key: 0,
        })
        .collect()
}

/// Replaces record ids in order, keeping source ids in step.
pub(crate) fn assign_ids(records: &mut [RawRecord], ids: impl IntoIterator<Item = u32>) {
    for (record, id) in records.iter_mut().zip(ids) {
        record.id = id;
        record.source_id = id;
    }
}

/// Attaches relationship values by record index.
pub(crate) fn attach_relations(records: &mut [RawRecord], map: Option<&RelationshipMap>) {
    let Some(map) = map else { return };
    let by_index: HashMap<u32, u32> = map
        .entries
        .iter()
        .map(|e| (e.record_index, e.foreign_id))
        .collect();
    for (index, record) in records.iter_mut().enumerate() {
        record.relation = by_index.get(&(index as u32)).copied();
    }
}

/// Encrypted sections carry a key hash and all-zero record bytes.
pub(crate) fn is_encrypted(tact_key_hash: u64, records: &[u8]) -> bool {
    tact_key_hash != 0 && records.iter().all(|&b| b == 0)
}

pub(crate) fn warn_encrypted(section: usize, tact_key_hash: u64, record_count: u32) {
    warn!(
        section,
        tact_key_hash = format_args!("{tact_key_hash:016X}"),
        record_count,
        "skipping encrypted section"
    );
}

/// Splits pallet and common regions into per-column tables.
pub(crate) fn column_data(
    meta: &TableMeta,
    pallet: &[u8],
    common: &[u8],
) -> WireResult<(Vec<Vec<Value32>>, Vec<HashMap<u32, Value32>>)> {
    let mut pallet_regions = Regions::new(pallet, 0);
    let mut common_regions = Regions::new(common, 0);
    let mut pallets = Vec::with_capacity(meta.column_meta.len());
    let mut commons = Vec::with_capacity(meta.column_meta.len());

    for cm in &meta.column_meta {
        let size = cm.additional_data_size as usize;
        let mut values = Vec::new();
        let mut overrides = HashMap::new();
        match cm.compression {
            ColumnCompression::Pallet { .. } | ColumnCompression::PalletArray { .. } => {
                values = pallet_regions.entries(size / 4, 4, Region::PalletData, |r| {
                    Ok(Value32::from_u32(r.read_u32_aligned()?))
                })?;
            }
            ColumnCompression::Common { .. } => {
                let entries = common_regions.entries(size / 8, 8, Region::CommonData, |r| {
                    Ok((r.read_u32_aligned()?, Value32::from_u32(r.read_u32_aligned()?)))
                })?;
                overrides.extend(entries);
            }
            _ => {}
        }
        pallets.push(values);
        commons.push(overrides);
    }
    Ok((pallets, commons))
}
