//! Fixed-size metadata records: field and column metadata, section headers,
//! copy/sparse entries and relationship maps.

use bitstream::{BitReader, BitWriter, Value32};

use crate::error::{DecodeError, EncodeError, WireResult};
use crate::header::Generation;

/// Legacy per-field layout entry (WDB5 and later).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMeta {
    /// Stored as `32 - width_in_bits`; may be negative for 64-bit fields.
    pub bits: i16,
    /// Byte offset of the field inside the record.
    pub offset: u16,
}

impl FieldMeta {
    /// Encoded size in bytes.
    pub const SIZE: usize = 4;

    /// Builds an entry for a field `width_bits` wide at `offset`.
    #[must_use]
    pub const fn new(width_bits: u32, offset: u16) -> Self {
        Self {
            bits: 32 - width_bits as i16,
            offset,
        }
    }

    /// Element width in bits.
    #[must_use]
    pub const fn width_bits(self) -> u32 {
        (32 - self.bits as i32) as u32
    }

    /// Element width in bytes.
    #[must_use]
    pub const fn width_bytes(self) -> usize {
        self.width_bits() as usize / 8
    }

    pub fn decode(r: &mut BitReader<'_>) -> WireResult<Self> {
        Ok(Self {
            bits: r.read_i16_aligned()?,
            offset: r.read_u16_aligned()?,
        })
    }

    pub fn encode(self, w: &mut BitWriter) -> Result<(), EncodeError> {
        w.write_i16_aligned(self.bits)?;
        w.write_u16_aligned(self.offset)?;
        Ok(())
    }
}

/// Column compression tags as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionKind {
    None,
    Immediate,
    Common,
    Pallet,
    PalletArray,
    SignedImmediate,
}

impl CompressionKind {
    /// The on-disk tag.
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Immediate => 1,
            Self::Common => 2,
            Self::Pallet => 3,
            Self::PalletArray => 4,
            Self::SignedImmediate => 5,
        }
    }

    /// Parses an on-disk tag.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::None,
            1 => Self::Immediate,
            2 => Self::Common,
            3 => Self::Pallet,
            4 => Self::PalletArray,
            5 => Self::SignedImmediate,
            _ => return None,
        })
    }
}

/// Kind-specific compression parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnCompression {
    None,
    Immediate {
        bit_offset: u32,
        bit_width: u32,
        flags: u32,
    },
    SignedImmediate {
        bit_offset: u32,
        bit_width: u32,
        flags: u32,
    },
    Common {
        default: Value32,
    },
    Pallet {
        bit_offset: u32,
        bit_width: u32,
        cardinality: u32,
    },
    PalletArray {
        bit_offset: u32,
        bit_width: u32,
        cardinality: u32,
    },
}

impl ColumnCompression {
    /// Immediate flag marking a sign-extended value.
    pub const SIGNED_FLAG: u32 = 1;

    #[must_use]
    pub const fn kind(&self) -> CompressionKind {
        match self {
            Self::None => CompressionKind::None,
            Self::Immediate { .. } => CompressionKind::Immediate,
            Self::SignedImmediate { .. } => CompressionKind::SignedImmediate,
            Self::Common { .. } => CompressionKind::Common,
            Self::Pallet { .. } => CompressionKind::Pallet,
            Self::PalletArray { .. } => CompressionKind::PalletArray,
        }
    }

    /// `true` for kinds whose values live inside the record bits.
    #[must_use]
    pub const fn is_bitpacked(&self) -> bool {
        matches!(
            self,
            Self::Immediate { .. }
                | Self::SignedImmediate { .. }
                | Self::Pallet { .. }
                | Self::PalletArray { .. }
        )
    }

    /// `true` if an immediate column sign-extends on read.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        match self {
            Self::SignedImmediate { .. } => true,
            Self::Immediate { flags, .. } => *flags & Self::SIGNED_FLAG != 0,
            _ => false,
        }
    }
}

/// Per-column storage metadata (WDC1 and later).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Bit offset of the column inside the record.
    pub record_offset: u16,
    /// Bits the column occupies inside the record.
    pub size: u16,
    /// Bytes of pallet or common data owned by this column.
    pub additional_data_size: u32,
    pub compression: ColumnCompression,
}

impl ColumnMeta {
    /// Encoded size in bytes.
    pub const SIZE: usize = 24;

    /// Decodes the entry for `column`.
    pub fn decode(r: &mut BitReader<'_>, column: usize) -> WireResult<Self> {
        let record_offset = r.read_u16_aligned()?;
        let size = r.read_u16_aligned()?;
        let additional_data_size = r.read_u32_aligned()?;
        let kind = r.read_u32_aligned()?;
        let a = r.read_u32_aligned()?;
        let b = r.read_u32_aligned()?;
        let c = r.read_u32_aligned()?;

        let compression = match CompressionKind::from_raw(kind) {
            Some(CompressionKind::None) => ColumnCompression::None,
            Some(CompressionKind::Immediate) => ColumnCompression::Immediate {
                bit_offset: a,
                bit_width: b,
                flags: c,
            },
            Some(CompressionKind::SignedImmediate) => ColumnCompression::SignedImmediate {
                bit_offset: a,
                bit_width: b,
                flags: c,
            },
            Some(CompressionKind::Common) => ColumnCompression::Common {
                default: Value32::from_u32(a),
            },
            Some(CompressionKind::Pallet) => ColumnCompression::Pallet {
                bit_offset: a,
                bit_width: b,
                cardinality: c,
            },
            Some(CompressionKind::PalletArray) => ColumnCompression::PalletArray {
                bit_offset: a,
                bit_width: b,
                cardinality: c,
            },
            None => return Err(DecodeError::UnknownCompression { column, kind }),
        };

        Ok(Self {
            record_offset,
            size,
            additional_data_size,
            compression,
        })
    }

    pub fn encode(&self, w: &mut BitWriter) -> Result<(), EncodeError> {
        w.write_u16_aligned(self.record_offset)?;
        w.write_u16_aligned(self.size)?;
        w.write_u32_aligned(self.additional_data_size)?;
        w.write_u32_aligned(self.compression.kind().raw())?;
        let params = match self.compression {
            ColumnCompression::None => [0, 0, 0],
            ColumnCompression::Immediate {
                bit_offset,
                bit_width,
                flags,
            }
            | ColumnCompression::SignedImmediate {
                bit_offset,
                bit_width,
                flags,
            } => [bit_offset, bit_width, flags],
            ColumnCompression::Common { default } => [default.as_u32(), 0, 0],
            ColumnCompression::Pallet {
                bit_offset,
                bit_width,
                cardinality,
            }
            | ColumnCompression::PalletArray {
                bit_offset,
                bit_width,
                cardinality,
            } => [bit_offset, bit_width, cardinality],
        };
        for word in params {
            w.write_u32_aligned(word)?;
        }
        Ok(())
    }
}

/// Per-section header (WDC2 and WDC3).
///
/// WDC2 stores copy tables in bytes and an offset-map offset; WDC3 stores
/// entry counts and the end of the sparse record block instead. Fields the
/// generation does not store stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionHeader {
    /// Non-zero when the section is encrypted with a TACT key.
    pub tact_key_hash: u64,
    pub file_offset: u32,
    pub record_count: u32,
    pub string_table_size: u32,
    /// WDC2: copy table size in bytes.
    pub copy_table_size: u32,
    /// WDC2: absolute offset of the sparse offset map.
    pub offset_map_offset: u32,
    /// WDC3: absolute end of the sparse record block.
    pub offset_records_end: u32,
    pub id_list_size: u32,
    pub relationship_data_size: u32,
    /// WDC3: entries in the per-record offset map.
    pub offset_map_id_count: u32,
    /// WDC3: entries in the copy table.
    pub copy_table_count: u32,
}

impl SectionHeader {
    /// Encoded size in bytes for `generation`.
    #[must_use]
    pub const fn size(generation: Generation) -> usize {
        match generation {
            Generation::Wdc3 => 40,
            _ => 36,
        }
    }

    pub fn decode(r: &mut BitReader<'_>, generation: Generation) -> WireResult<Self> {
        let mut s = Self {
            tact_key_hash: r.read_u64_aligned()?,
            file_offset: r.read_u32_aligned()?,
            record_count: r.read_u32_aligned()?,
            string_table_size: r.read_u32_aligned()?,
            ..Self::default()
        };
        if generation == Generation::Wdc3 {
            s.offset_records_end = r.read_u32_aligned()?;
            s.id_list_size = r.read_u32_aligned()?;
            s.relationship_data_size = r.read_u32_aligned()?;
            s.offset_map_id_count = r.read_u32_aligned()?;
            s.copy_table_count = r.read_u32_aligned()?;
        } else {
            s.copy_table_size = r.read_u32_aligned()?;
            s.offset_map_offset = r.read_u32_aligned()?;
            s.id_list_size = r.read_u32_aligned()?;
            s.relationship_data_size = r.read_u32_aligned()?;
        }
        Ok(s)
    }

    pub fn encode(&self, w: &mut BitWriter, generation: Generation) -> Result<(), EncodeError> {
        w.write_u64_aligned(self.tact_key_hash)?;
        w.write_u32_aligned(self.file_offset)?;
        w.write_u32_aligned(self.record_count)?;
        w.write_u32_aligned(self.string_table_size)?;
        if generation == Generation::Wdc3 {
            w.write_u32_aligned(self.offset_records_end)?;
            w.write_u32_aligned(self.id_list_size)?;
            w.write_u32_aligned(self.relationship_data_size)?;
            w.write_u32_aligned(self.offset_map_id_count)?;
            w.write_u32_aligned(self.copy_table_count)?;
        } else {
            w.write_u32_aligned(self.copy_table_size)?;
            w.write_u32_aligned(self.offset_map_offset)?;
            w.write_u32_aligned(self.id_list_size)?;
            w.write_u32_aligned(self.relationship_data_size)?;
        }
        Ok(())
    }

    /// Number of copy-table entries regardless of generation.
    #[must_use]
    pub const fn copy_entries(&self) -> usize {
        if self.copy_table_count != 0 {
            self.copy_table_count as usize
        } else {
            self.copy_table_size as usize / CopyEntry::SIZE
        }
    }
}

/// A copy-table pair: `new_id` reads the record bytes of `source_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CopyEntry {
    pub new_id: u32,
    pub source_id: u32,
}

impl CopyEntry {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    pub fn decode(r: &mut BitReader<'_>) -> WireResult<Self> {
        Ok(Self {
            new_id: r.read_u32_aligned()?,
            source_id: r.read_u32_aligned()?,
        })
    }

    pub fn encode(self, w: &mut BitWriter) -> Result<(), EncodeError> {
        w.write_u32_aligned(self.new_id)?;
        w.write_u32_aligned(self.source_id)?;
        Ok(())
    }
}

/// An offset-map entry locating one variable-length record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SparseEntry {
    /// Absolute file offset of the record.
    pub offset: u32,
    /// Record length in bytes; zero marks an unused id.
    pub size: u16,
}

impl SparseEntry {
    /// Encoded size in bytes.
    pub const SIZE: usize = 6;

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.offset == 0 && self.size == 0
    }

    pub fn decode(r: &mut BitReader<'_>) -> WireResult<Self> {
        Ok(Self {
            offset: r.read_u32_aligned()?,
            size: r.read_u16_aligned()?,
        })
    }

    pub fn encode(self, w: &mut BitWriter) -> Result<(), EncodeError> {
        w.write_u32_aligned(self.offset)?;
        w.write_u16_aligned(self.size)?;
        Ok(())
    }
}

/// One relationship-map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipEntry {
    pub foreign_id: u32,
    pub record_index: u32,
}

/// Relationship map carrying a non-inline foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationshipMap {
    pub min_id: u32,
    pub max_id: u32,
    pub entries: Vec<RelationshipEntry>,
}

impl RelationshipMap {
    /// Size of the fixed prefix (entry count, min id, max id).
    pub const PREFIX_SIZE: usize = 12;

    /// Builds a map from entries, deriving the id range from the foreign ids.
    #[must_use]
    pub fn from_entries(entries: Vec<RelationshipEntry>) -> Self {
        let min_id = entries.iter().map(|e| e.foreign_id).min().unwrap_or(0);
        let max_id = entries.iter().map(|e| e.foreign_id).max().unwrap_or(0);
        Self {
            min_id,
            max_id,
            entries,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        Self::PREFIX_SIZE + self.entries.len() * 8
    }

    pub fn decode(r: &mut BitReader<'_>) -> WireResult<Self> {
        let count = r.read_u32_aligned()? as usize;
        let min_id = r.read_u32_aligned()?;
        let max_id = r.read_u32_aligned()?;
        if count.saturating_mul(8) > r.bits_remaining() / 8 {
            return Err(DecodeError::Truncated {
                region: crate::error::Region::RelationshipMap,
                needed: count.saturating_mul(8),
                available: r.bits_remaining() / 8,
            });
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(RelationshipEntry {
                foreign_id: r.read_u32_aligned()?,
                record_index: r.read_u32_aligned()?,
            });
        }
        Ok(Self {
            min_id,
            max_id,
            entries,
        })
    }

    pub fn encode(&self, w: &mut BitWriter) -> Result<(), EncodeError> {
        let count = u32::try_from(self.entries.len()).map_err(|_| EncodeError::ValueOverflow {
            field: "relationship entry count",
            value: self.entries.len() as u64,
        })?;
        w.write_u32_aligned(count)?;
        w.write_u32_aligned(self.min_id)?;
        w.write_u32_aligned(self.max_id)?;
        for entry in &self.entries {
            w.write_u32_aligned(entry.foreign_id)?;
            w.write_u32_aligned(entry.record_index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_meta_width() {
        let meta = FieldMeta::new(20, 4);
        assert_eq!(meta.bits, 12);
        assert_eq!(meta.width_bits(), 20);

        let wide = FieldMeta { bits: -32, offset: 0 };
        assert_eq!(wide.width_bits(), 64);
        assert_eq!(wide.width_bytes(), 8);
    }

    #[test]
    fn field_meta_roundtrip() {
        let meta = FieldMeta::new(64, 12);
        let mut w = BitWriter::new();
        meta.encode(&mut w).unwrap();
        let bytes = w.finish();
        assert_eq!(bytes, vec![0xE0, 0xFF, 12, 0]);
        assert_eq!(FieldMeta::decode(&mut BitReader::new(&bytes)).unwrap(), meta);
    }

    #[test]
    fn immediate_signedness_follows_kind_and_flag() {
        let plain = ColumnCompression::Immediate {
            bit_offset: 0,
            bit_width: 4,
            flags: 0,
        };
        let flagged = ColumnCompression::Immediate {
            bit_offset: 0,
            bit_width: 4,
            flags: ColumnCompression::SIGNED_FLAG,
        };
        let signed = ColumnCompression::SignedImmediate {
            bit_offset: 0,
            bit_width: 4,
            flags: 0,
        };
        assert!(!plain.is_signed());
        assert!(flagged.is_signed());
        assert!(signed.is_signed());
        assert!(!ColumnCompression::None.is_signed());
    }

    #[test]
    fn column_meta_roundtrip_every_kind() {
        let kinds = [
            ColumnCompression::None,
            ColumnCompression::Immediate {
                bit_offset: 3,
                bit_width: 7,
                flags: 0,
            },
            ColumnCompression::SignedImmediate {
                bit_offset: 10,
                bit_width: 5,
                flags: 1,
            },
            ColumnCompression::Common {
                default: Value32::from_f32(1.0),
            },
            ColumnCompression::Pallet {
                bit_offset: 15,
                bit_width: 2,
                cardinality: 0,
            },
            ColumnCompression::PalletArray {
                bit_offset: 17,
                bit_width: 1,
                cardinality: 3,
            },
        ];
        for compression in kinds {
            let meta = ColumnMeta {
                record_offset: 32,
                size: 7,
                additional_data_size: 16,
                compression,
            };
            let mut w = BitWriter::new();
            meta.encode(&mut w).unwrap();
            let bytes = w.finish();
            assert_eq!(bytes.len(), ColumnMeta::SIZE);
            assert_eq!(
                ColumnMeta::decode(&mut BitReader::new(&bytes), 0).unwrap(),
                meta
            );
        }
    }

    #[test]
    fn column_meta_rejects_unknown_kind() {
        let mut w = BitWriter::new();
        w.write_u16_aligned(0).unwrap();
        w.write_u16_aligned(32).unwrap();
        w.write_u32_aligned(0).unwrap();
        w.write_u32_aligned(9).unwrap();
        w.write_bytes(&[0; 12]).unwrap();
        let bytes = w.finish();
        let err = ColumnMeta::decode(&mut BitReader::new(&bytes), 4).unwrap_err();
        assert_eq!(err, DecodeError::UnknownCompression { column: 4, kind: 9 });
    }

    #[test]
    fn signedness() {
        assert!(ColumnCompression::SignedImmediate {
            bit_offset: 0,
            bit_width: 1,
            flags: 0
        }
        .is_signed());
        assert!(ColumnCompression::Immediate {
            bit_offset: 0,
            bit_width: 1,
            flags: 1
        }
        .is_signed());
        assert!(!ColumnCompression::None.is_signed());
    }

    #[test]
    fn section_header_sizes() {
        for generation in [Generation::Wdc2, Generation::Wdc3] {
            let header = SectionHeader {
                tact_key_hash: 0x0102_0304_0506_0708,
                file_offset: 200,
                record_count: 5,
                string_table_size: 11,
                id_list_size: 20,
                ..SectionHeader::default()
            };
            let mut w = BitWriter::new();
            header.encode(&mut w, generation).unwrap();
            let bytes = w.finish();
            assert_eq!(bytes.len(), SectionHeader::size(generation));
            assert_eq!(
                SectionHeader::decode(&mut BitReader::new(&bytes), generation).unwrap(),
                header
            );
        }
    }

    #[test]
    fn copy_entries_by_generation() {
        let wdc2 = SectionHeader {
            copy_table_size: 24,
            ..SectionHeader::default()
        };
        assert_eq!(wdc2.copy_entries(), 3);
        let wdc3 = SectionHeader {
            copy_table_count: 2,
            ..SectionHeader::default()
        };
        assert_eq!(wdc3.copy_entries(), 2);
    }

    #[test]
    fn sparse_entry_empty() {
        assert!(SparseEntry::default().is_empty());
        assert!(!SparseEntry { offset: 4, size: 0 }.is_empty());
    }

    #[test]
    fn relationship_map_roundtrip() {
        let map = RelationshipMap::from_entries(vec![
            RelationshipEntry {
                foreign_id: 40,
                record_index: 0,
            },
            RelationshipEntry {
                foreign_id: 7,
                record_index: 2,
            },
        ]);
        assert_eq!(map.min_id, 7);
        assert_eq!(map.max_id, 40);
        let mut w = BitWriter::new();
        map.encode(&mut w).unwrap();
        let bytes = w.finish();
        assert_eq!(bytes.len(), map.encoded_len());
        assert_eq!(RelationshipMap::decode(&mut BitReader::new(&bytes)).unwrap(), map);
    }

    #[test]
    fn relationship_map_rejects_oversized_count() {
        let mut w = BitWriter::new();
        w.write_u32_aligned(1000).unwrap();
        w.write_u32_aligned(0).unwrap();
        w.write_u32_aligned(0).unwrap();
        let bytes = w.finish();
        assert!(matches!(
            RelationshipMap::decode(&mut BitReader::new(&bytes)),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
