//! Headers, metadata records and decode limits for the wdc table file family.
//!
//! This crate handles the fixed-size structures of every generation
//! (`WDBC`, `WDB2`, `WDB5`, `WDB6`, `WDC1`, `WDC2`, `WDC3`): the table header,
//! field and column metadata, section headers, copy/sparse entries and
//! relationship maps. It does not know about column values or record
//! contents, only the structure around them.
//!
//! # Design Principles
//!
//! - **Byte-exact** - Every structure encodes back to the bytes it was decoded from.
//! - **Bounded decoding** - Declared counts are validated against [`Limits`] before iteration.
//! - **No domain knowledge** - This crate frames tables, it does not interpret rows.

mod error;
mod header;
mod limits;
mod meta;

pub use error::{region_slice, DecodeError, EncodeError, LimitKind, Region, WireResult};
pub use header::{Generation, TableFlags, TableHeader};
pub use limits::Limits;
pub use meta::{
    ColumnCompression, ColumnMeta, CompressionKind, CopyEntry, FieldMeta, RelationshipEntry,
    RelationshipMap, SectionHeader, SparseEntry,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn public_api_exports() {
        // Verify all expected items are exported
        let _ = Generation::Wdc3;
        let _ = TableFlags::default();
        let _ = TableHeader::new(Generation::Wdbc);
        let _ = Limits::default();
        let _ = CompressionKind::Pallet;
        let _ = FieldMeta::default();
        let _ = SectionHeader::default();
        let _ = RelationshipMap::default();
        let _ = Region::Records;

        // Error types
        let _: WireResult<()> = Ok(());
    }

    #[test]
    fn wdc1_header_size_constant_correct() {
        assert_eq!(
            Generation::Wdc1.header_size(),
            4 // magic
                + size_of::<u32>() * 10 // counts, sizes, hashes, id range, locale, copy size
                + size_of::<u16>() * 2 // flags, id index
                + size_of::<u32>() * 9 // bit-packing and region sizes
        );
    }

    #[test]
    fn wdc3_section_layout_constants() {
        assert_eq!(SectionHeader::size(Generation::Wdc3), 8 + 4 * 8);
        assert_eq!(ColumnMeta::SIZE, 2 + 2 + 4 + 4 + 12);
        assert_eq!(SparseEntry::SIZE, 6);
    }
}
