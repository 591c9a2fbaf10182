//! Decoded tables: metadata, sections and raw records.

use std::collections::HashMap;
use std::sync::Arc;

use bitstream::Value32;
use rayon::prelude::*;
use schema::TableSchema;
use tracing::debug;
use wire::{
    ColumnMeta, CopyEntry, FieldMeta, Region, RelationshipMap, SectionHeader, SparseEntry,
    TableHeader,
};

use crate::column::decode_record;
use crate::error::CodecResult;
use crate::layout::TableLayout;
use crate::strings::StringBlock;
use crate::value::Row;

/// Header plus per-field metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub header: TableHeader,
    /// WDB5 and later.
    pub field_meta: Vec<FieldMeta>,
    /// WDC1 and later.
    pub column_meta: Vec<ColumnMeta>,
    /// WDB6: common-block type byte per listed column.
    pub common_types: Vec<u8>,
}

impl TableMeta {
    #[must_use]
    pub const fn new(header: TableHeader) -> Self {
        Self {
            header,
            field_meta: Vec::new(),
            column_meta: Vec::new(),
            common_types: Vec::new(),
        }
    }
}

/// One record as located in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord {
    pub id: u32,
    /// The id whose record bytes this row uses. Equal to `id` except for
    /// copy rows, which still read common values under their own id.
    pub source_id: u32,
    /// Byte offset of the record in the file.
    pub offset: usize,
    pub len: usize,
    pub section: usize,
    /// Byte position in the virtual record region, for relative strings.
    pub region_position: usize,
    pub relation: Option<u32>,
    /// WDB5/WDB6 secondary key.
    pub secondary_key: u32,
}

impl RawRecord {
    #[must_use]
    pub const fn is_copy(&self) -> bool {
        self.id != self.source_id
    }
}

/// One data section and the structures stored beside its records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionInfo {
    /// As read; single-section generations fill the counts only.
    pub header: SectionHeader,
    pub encrypted: bool,
    pub id_list: Vec<u32>,
    pub copy_table: Vec<CopyEntry>,
    pub offset_map: Vec<SparseEntry>,
    /// WDC3: ids of the sparse offset map.
    pub sparse_ids: Vec<u32>,
    pub relationship: Option<RelationshipMap>,
    /// Bytes of the record region (fixed records or sparse data).
    pub records_len: usize,
    pub string_table_len: usize,
}

/// An encrypted section that was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptedSection {
    pub index: usize,
    pub tact_key_hash: u64,
    pub record_count: u32,
}

/// A decoded table: metadata, regions and located records.
///
/// Records are located but not decoded; [`rows`](Self::rows) materializes
/// them against a schema. Copy rows share their source's bytes.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub(crate) meta: TableMeta,
    pub(crate) data: Arc<[u8]>,
    pub(crate) strings: StringBlock,
    /// Length of the virtual record region of every section.
    pub(crate) records_len: usize,
    /// Per field: pallet values.
    pub(crate) pallets: Vec<Vec<Value32>>,
    /// Per field: common overrides by id.
    pub(crate) commons: Vec<HashMap<u32, Value32>>,
    /// WDB6: per listed column, common values by id.
    pub(crate) legacy_commons: Vec<HashMap<u32, Value32>>,
    pub(crate) sections: Vec<SectionInfo>,
    pub(crate) records: Vec<RawRecord>,
    pub(crate) parallel_threshold: usize,
}

impl RecordSet {
    #[must_use]
    pub const fn header(&self) -> &TableHeader {
        &self.meta.header
    }

    #[must_use]
    pub const fn meta(&self) -> &TableMeta {
        &self.meta
    }

    /// Records in row order: explicit records, then copies.
    #[must_use]
    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    #[must_use]
    pub fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub const fn strings(&self) -> &StringBlock {
        &self.strings
    }

    /// Pallet values of `field`; empty for other kinds.
    #[must_use]
    pub fn pallet(&self, field: usize) -> &[Value32] {
        self.pallets.get(field).map_or(&[], Vec::as_slice)
    }

    /// Common overrides of `field`.
    #[must_use]
    pub fn common(&self, field: usize) -> Option<&HashMap<u32, Value32>> {
        self.commons.get(field)
    }

    /// Sections skipped because their records are encrypted.
    #[must_use]
    pub fn encrypted_sections(&self) -> Vec<EncryptedSection> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.encrypted)
            .map(|(index, s)| EncryptedSection {
                index,
                tact_key_hash: s.header.tact_key_hash,
                record_count: s.header.record_count,
            })
            .collect()
    }

    /// The bytes of `record`.
    pub fn record_bytes(&self, record: &RawRecord) -> CodecResult<&[u8]> {
        Ok(wire::region_slice(
            &self.data,
            record.offset,
            record.len,
            Region::Records,
        )?)
    }

    /// Decodes every record against `schema`.
    ///
    /// Decoding runs on the rayon pool once the table reaches the
    /// configured parallel threshold; row order is preserved either way.
    pub fn rows(&self, schema: &TableSchema) -> CodecResult<Vec<Row>> {
        let layout = TableLayout::resolve(&self.meta, schema)?;
        let parallel = self.records.len() >= self.parallel_threshold;
        debug!(
            table = %schema.name,
            rows = self.records.len(),
            parallel,
            "materializing rows"
        );
        if parallel {
            self.records
                .par_iter()
                .map(|record| decode_record(self, &layout, schema, record))
                .collect()
        } else {
            self.records
                .iter()
                .map(|record| decode_record(self, &layout, schema, record))
                .collect()
        }
    }
}
