//! File generations, flags and the table header.

use std::fmt;

use bitstream::{BitReader, BitWriter};

use crate::error::{DecodeError, EncodeError, WireResult};

/// A table file generation, identified by its leading 4-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Generation {
    Wdbc,
    Wdb2,
    Wdb5,
    Wdb6,
    Wdc1,
    Wdc2,
    Wdc3,
}

impl Generation {
    /// All supported generations, oldest first.
    pub const ALL: [Self; 7] = [
        Self::Wdbc,
        Self::Wdb2,
        Self::Wdb5,
        Self::Wdb6,
        Self::Wdc1,
        Self::Wdc2,
        Self::Wdc3,
    ];

    /// The on-disk tag.
    #[must_use]
    pub const fn tag(self) -> [u8; 4] {
        match self {
            Self::Wdbc => *b"WDBC",
            Self::Wdb2 => *b"WDB2",
            Self::Wdb5 => *b"WDB5",
            Self::Wdb6 => *b"WDB6",
            Self::Wdc1 => *b"WDC1",
            Self::Wdc2 => *b"WDC2",
            Self::Wdc3 => *b"WDC3",
        }
    }

    /// Looks up a generation by tag.
    #[must_use]
    pub fn from_tag(tag: [u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.tag() == tag)
    }

    /// Size of the fixed header in bytes, tag included.
    #[must_use]
    pub const fn header_size(self) -> usize {
        match self {
            Self::Wdbc => 20,
            Self::Wdb2 | Self::Wdb5 => 48,
            Self::Wdb6 => 56,
            Self::Wdc1 => 84,
            Self::Wdc2 | Self::Wdc3 => 72,
        }
    }

    /// `true` if the file carries per-field width/offset metadata.
    #[must_use]
    pub const fn has_field_meta(self) -> bool {
        !matches!(self, Self::Wdbc | Self::Wdb2)
    }

    /// `true` if the file carries per-column compression metadata.
    #[must_use]
    pub const fn has_column_meta(self) -> bool {
        matches!(self, Self::Wdc1 | Self::Wdc2 | Self::Wdc3)
    }

    /// `true` if record data is split into section blocks.
    #[must_use]
    pub const fn is_multi_section(self) -> bool {
        matches!(self, Self::Wdc2 | Self::Wdc3)
    }

    /// `true` if string offsets are relative to the field's own position.
    #[must_use]
    pub const fn has_relative_strings(self) -> bool {
        self.is_multi_section()
    }

    /// `true` if the header names an inline id column.
    #[must_use]
    pub const fn has_id_index(self) -> bool {
        self.has_field_meta()
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        write!(f, "{}", String::from_utf8_lossy(&tag))
    }
}

/// Table flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TableFlags(u16);

impl TableFlags {
    /// Records are variable-length and addressed through an offset map.
    pub const SPARSE: u16 = 1 << 0;

    /// A secondary key array follows the string table.
    pub const SECONDARY_KEY: u16 = 1 << 1;

    /// Record ids come from an explicit id list.
    pub const INDEX: u16 = 1 << 2;

    /// Set by some toolchains; carried through unchanged.
    pub const UNKNOWN: u16 = 1 << 3;

    /// Columns are bit-packed.
    pub const BIT_PACKED: u16 = 1 << 4;

    /// Creates new flags from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` if the sparse layout is used.
    #[must_use]
    pub const fn is_sparse(self) -> bool {
        self.0 & Self::SPARSE != 0
    }

    /// Returns `true` if a secondary key array is present.
    #[must_use]
    pub const fn has_secondary_key(self) -> bool {
        self.0 & Self::SECONDARY_KEY != 0
    }

    /// Returns `true` if ids come from an explicit id list.
    #[must_use]
    pub const fn has_index(self) -> bool {
        self.0 & Self::INDEX != 0
    }

    /// Returns `true` if columns are bit-packed.
    #[must_use]
    pub const fn is_bit_packed(self) -> bool {
        self.0 & Self::BIT_PACKED != 0
    }

    /// Returns a copy with `flag` set or cleared.
    #[must_use]
    pub const fn with(self, flag: u16, on: bool) -> Self {
        if on {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }
}

/// The fixed header of a table file.
///
/// One struct covers every generation; fields a generation does not store
/// stay zero. Counts and sizes are recomputed on write, identity fields
/// (hashes, build, locale, flags, id index, lookup column count) are carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    pub generation: Generation,
    pub record_count: u32,
    pub field_count: u32,
    pub record_size: u32,
    /// For sparse WDB5/WDB6 files this holds the absolute offset-map offset.
    pub string_table_size: u32,
    pub table_hash: u32,
    pub layout_hash: u32,
    pub build: u32,
    pub timestamp: u32,
    pub min_id: u32,
    pub max_id: u32,
    pub locale: u32,
    pub copy_table_size: u32,
    pub flags: TableFlags,
    pub id_index: u16,
    pub total_field_count: u32,
    pub bitpacked_data_offset: u32,
    pub lookup_column_count: u32,
    pub offset_map_offset: u32,
    pub id_list_size: u32,
    pub field_storage_info_size: u32,
    pub common_data_size: u32,
    pub pallet_data_size: u32,
    pub relationship_data_size: u32,
    pub section_count: u32,
}

impl TableHeader {
    /// Creates an all-zero header for `generation`.
    #[must_use]
    pub const fn new(generation: Generation) -> Self {
        Self {
            generation,
            record_count: 0,
            field_count: 0,
            record_size: 0,
            string_table_size: 0,
            table_hash: 0,
            layout_hash: 0,
            build: 0,
            timestamp: 0,
            min_id: 0,
            max_id: 0,
            locale: 0,
            copy_table_size: 0,
            flags: TableFlags::from_raw(0),
            id_index: 0,
            total_field_count: 0,
            bitpacked_data_offset: 0,
            lookup_column_count: 0,
            offset_map_offset: 0,
            id_list_size: 0,
            field_storage_info_size: 0,
            common_data_size: 0,
            pallet_data_size: 0,
            relationship_data_size: 0,
            section_count: 0,
        }
    }

    /// Number of data sections (1 for single-section generations).
    #[must_use]
    pub const fn sections(&self) -> u32 {
        if self.generation.is_multi_section() {
            self.section_count
        } else {
            1
        }
    }

    /// Decodes the header at the start of `buf`.
    pub fn decode(buf: &[u8]) -> WireResult<Self> {
        let Some(tag) = buf.get(..4) else {
            return Err(DecodeError::TooSmall {
                actual: buf.len(),
                required: 4,
            });
        };
        let found = [tag[0], tag[1], tag[2], tag[3]];
        let generation = Generation::from_tag(found).ok_or(DecodeError::InvalidMagic { found })?;
        let required = generation.header_size();
        if buf.len() < required {
            return Err(DecodeError::TooSmall {
                actual: buf.len(),
                required,
            });
        }

        let mut r = BitReader::at_byte(buf, 4)?;
        let mut h = Self::new(generation);
        h.record_count = r.read_u32_aligned()?;
        h.field_count = r.read_u32_aligned()?;
        h.record_size = r.read_u32_aligned()?;
        h.string_table_size = r.read_u32_aligned()?;

        match generation {
            Generation::Wdbc => {}
            Generation::Wdb2 => {
                h.table_hash = r.read_u32_aligned()?;
                h.build = r.read_u32_aligned()?;
                h.timestamp = r.read_u32_aligned()?;
                h.min_id = r.read_u32_aligned()?;
                h.max_id = r.read_u32_aligned()?;
                h.locale = r.read_u32_aligned()?;
                h.copy_table_size = r.read_u32_aligned()?;
            }
            Generation::Wdb5 | Generation::Wdb6 | Generation::Wdc1 => {
                h.table_hash = r.read_u32_aligned()?;
                h.layout_hash = r.read_u32_aligned()?;
                h.min_id = r.read_u32_aligned()?;
                h.max_id = r.read_u32_aligned()?;
                h.locale = r.read_u32_aligned()?;
                h.copy_table_size = r.read_u32_aligned()?;
                h.flags = TableFlags::from_raw(r.read_u16_aligned()?);
                h.id_index = r.read_u16_aligned()?;
                if generation == Generation::Wdb6 {
                    h.total_field_count = r.read_u32_aligned()?;
                    h.common_data_size = r.read_u32_aligned()?;
                } else if generation == Generation::Wdc1 {
                    h.total_field_count = r.read_u32_aligned()?;
                    h.bitpacked_data_offset = r.read_u32_aligned()?;
                    h.lookup_column_count = r.read_u32_aligned()?;
                    h.offset_map_offset = r.read_u32_aligned()?;
                    h.id_list_size = r.read_u32_aligned()?;
                    h.field_storage_info_size = r.read_u32_aligned()?;
                    h.common_data_size = r.read_u32_aligned()?;
                    h.pallet_data_size = r.read_u32_aligned()?;
                    h.relationship_data_size = r.read_u32_aligned()?;
                }
            }
            Generation::Wdc2 | Generation::Wdc3 => {
                h.table_hash = r.read_u32_aligned()?;
                h.layout_hash = r.read_u32_aligned()?;
                h.min_id = r.read_u32_aligned()?;
                h.max_id = r.read_u32_aligned()?;
                h.locale = r.read_u32_aligned()?;
                h.flags = TableFlags::from_raw(r.read_u16_aligned()?);
                h.id_index = r.read_u16_aligned()?;
                h.total_field_count = r.read_u32_aligned()?;
                h.bitpacked_data_offset = r.read_u32_aligned()?;
                h.lookup_column_count = r.read_u32_aligned()?;
                h.field_storage_info_size = r.read_u32_aligned()?;
                h.common_data_size = r.read_u32_aligned()?;
                h.pallet_data_size = r.read_u32_aligned()?;
                h.section_count = r.read_u32_aligned()?;
            }
        }
        debug_assert_eq!(r.byte_position(), required);
        Ok(h)
    }

    /// Appends the encoded header to `w`.
    pub fn encode(&self, w: &mut BitWriter) -> Result<(), EncodeError> {
        let start = w.byte_len();
        w.write_bytes(&self.generation.tag())?;
        w.write_u32_aligned(self.record_count)?;
        w.write_u32_aligned(self.field_count)?;
        w.write_u32_aligned(self.record_size)?;
        w.write_u32_aligned(self.string_table_size)?;

        match self.generation {
            Generation::Wdbc => {}
            Generation::Wdb2 => {
                w.write_u32_aligned(self.table_hash)?;
                w.write_u32_aligned(self.build)?;
                w.write_u32_aligned(self.timestamp)?;
                w.write_u32_aligned(self.min_id)?;
                w.write_u32_aligned(self.max_id)?;
                w.write_u32_aligned(self.locale)?;
                w.write_u32_aligned(self.copy_table_size)?;
            }
            Generation::Wdb5 | Generation::Wdb6 | Generation::Wdc1 => {
                w.write_u32_aligned(self.table_hash)?;
                w.write_u32_aligned(self.layout_hash)?;
                w.write_u32_aligned(self.min_id)?;
                w.write_u32_aligned(self.max_id)?;
                w.write_u32_aligned(self.locale)?;
                w.write_u32_aligned(self.copy_table_size)?;
                w.write_u16_aligned(self.flags.raw())?;
                w.write_u16_aligned(self.id_index)?;
                if self.generation == Generation::Wdb6 {
                    w.write_u32_aligned(self.total_field_count)?;
                    w.write_u32_aligned(self.common_data_size)?;
                } else if self.generation == Generation::Wdc1 {
                    w.write_u32_aligned(self.total_field_count)?;
                    w.write_u32_aligned(self.bitpacked_data_offset)?;
                    w.write_u32_aligned(self.lookup_column_count)?;
                    w.write_u32_aligned(self.offset_map_offset)?;
                    w.write_u32_aligned(self.id_list_size)?;
                    w.write_u32_aligned(self.field_storage_info_size)?;
                    w.write_u32_aligned(self.common_data_size)?;
                    w.write_u32_aligned(self.pallet_data_size)?;
                    w.write_u32_aligned(self.relationship_data_size)?;
                }
            }
            Generation::Wdc2 | Generation::Wdc3 => {
                w.write_u32_aligned(self.table_hash)?;
                w.write_u32_aligned(self.layout_hash)?;
                w.write_u32_aligned(self.min_id)?;
                w.write_u32_aligned(self.max_id)?;
                w.write_u32_aligned(self.locale)?;
                w.write_u16_aligned(self.flags.raw())?;
                w.write_u16_aligned(self.id_index)?;
                w.write_u32_aligned(self.total_field_count)?;
                w.write_u32_aligned(self.bitpacked_data_offset)?;
                w.write_u32_aligned(self.lookup_column_count)?;
                w.write_u32_aligned(self.field_storage_info_size)?;
                w.write_u32_aligned(self.common_data_size)?;
                w.write_u32_aligned(self.pallet_data_size)?;
                w.write_u32_aligned(self.section_count)?;
            }
        }
        debug_assert_eq!(w.byte_len() - start, self.generation.header_size());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(generation: Generation) -> TableHeader {
        let mut h = TableHeader::new(generation);
        h.record_count = 3;
        h.field_count = 4;
        h.record_size = 12;
        h.string_table_size = 9;
        if generation == Generation::Wdb2 {
            h.build = 12_340;
            h.timestamp = 99;
        }
        if generation != Generation::Wdbc {
            h.table_hash = 0xDEAD_BEEF;
            h.min_id = 1;
            h.max_id = 3;
            h.locale = 0x10;
        }
        if generation.has_id_index() {
            h.flags = TableFlags::from_raw(TableFlags::INDEX | TableFlags::BIT_PACKED);
            h.layout_hash = 0x1234_5678;
        }
        if generation >= Generation::Wdb6 {
            h.total_field_count = 5;
            h.common_data_size = 16;
        }
        if generation >= Generation::Wdc1 {
            h.bitpacked_data_offset = 4;
            h.lookup_column_count = 1;
            h.field_storage_info_size = 96;
            h.pallet_data_size = 8;
        }
        if generation == Generation::Wdc1 {
            h.id_list_size = 12;
            h.relationship_data_size = 12;
        }
        if generation.is_multi_section() {
            h.section_count = 2;
        }
        h
    }

    #[test]
    fn tag_lookup() {
        for generation in Generation::ALL {
            assert_eq!(Generation::from_tag(generation.tag()), Some(generation));
        }
        assert_eq!(Generation::from_tag(*b"WDB3"), None);
        assert_eq!(Generation::Wdc3.to_string(), "WDC3");
    }

    #[test]
    fn header_roundtrip_every_generation() {
        for generation in Generation::ALL {
            let header = sample(generation);
            let mut w = BitWriter::new();
            header.encode(&mut w).unwrap();
            let bytes = w.finish();
            assert_eq!(bytes.len(), generation.header_size(), "{generation}");
            assert_eq!(TableHeader::decode(&bytes).unwrap(), header, "{generation}");
        }
    }

    #[test]
    fn wdbc_layout_is_five_words() {
        let bytes = [
            b'W', b'D', b'B', b'C', 2, 0, 0, 0, 3, 0, 0, 0, 12, 0, 0, 0, 1, 0, 0, 0,
        ];
        let header = TableHeader::decode(&bytes).unwrap();
        assert_eq!(header.record_count, 2);
        assert_eq!(header.field_count, 3);
        assert_eq!(header.record_size, 12);
        assert_eq!(header.string_table_size, 1);
        assert_eq!(header.sections(), 1);
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let err = TableHeader::decode(b"WDX9aaaaaaaaaaaaaaaaaaaa").unwrap_err();
        assert_eq!(err, DecodeError::InvalidMagic { found: *b"WDX9" });
    }

    #[test]
    fn decode_rejects_short_header() {
        let err = TableHeader::decode(b"WDC3\0\0\0\0").unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooSmall {
                actual: 8,
                required: 72
            }
        );
        assert!(matches!(
            TableHeader::decode(b"WD"),
            Err(DecodeError::TooSmall { required: 4, .. })
        ));
    }

    #[test]
    fn flags_accessors() {
        let flags = TableFlags::from_raw(TableFlags::SPARSE | TableFlags::INDEX);
        assert!(flags.is_sparse());
        assert!(flags.has_index());
        assert!(!flags.has_secondary_key());
        assert!(!flags.is_bit_packed());
        let flags = flags.with(TableFlags::SPARSE, false);
        assert!(!flags.is_sparse());
        assert_eq!(flags.raw(), TableFlags::INDEX);
    }

    #[test]
    fn generation_capabilities() {
        assert!(!Generation::Wdb2.has_field_meta());
        assert!(Generation::Wdb5.has_field_meta());
        assert!(!Generation::Wdb6.has_column_meta());
        assert!(Generation::Wdc1.has_column_meta());
        assert!(!Generation::Wdc1.is_multi_section());
        assert!(Generation::Wdc2.has_relative_strings());
    }
}
