//! Write templates: the identity and structure a written table keeps.

use std::collections::HashMap;

use schema::{Arity, TableSchema, ValueType};
use wire::{
    ColumnCompression, ColumnMeta, EncodeError, FieldMeta, Generation, TableFlags, TableHeader,
};

use crate::derive::{u16_field, u32_field};
use crate::error::{CodecError, CodecResult, MismatchReason};
use crate::layout::has_inline_id;
use crate::record::{RecordSet, SectionInfo, TableMeta};

/// Where a known id lived, and what it carried beside its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordMeta {
    pub section: usize,
    /// WDB5/WDB6 secondary key.
    pub secondary_key: u32,
}

/// An encrypted section carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservedSection {
    pub info: SectionInfo,
    /// The section's string table bytes.
    pub strings: Vec<u8>,
    /// Header min id its dense offset map was laid out against.
    pub min_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionTemplate {
    pub tact_key_hash: u64,
    /// Set for encrypted sections.
    pub preserved: Option<PreservedSection>,
}

/// What a writer needs besides the rows.
///
/// Take one from [`RecordSet::template`] to rewrite an existing table, or
/// build one from a schema with [`TableTemplate::builder`]. Counts, sizes,
/// dictionaries and offsets in the header are always recomputed; hashes,
/// build, locale, flags, id index and lookup column count are carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTemplate {
    pub meta: TableMeta,
    pub sections: Vec<SectionTemplate>,
    pub records: HashMap<u32, RecordMeta>,
    /// WDB2: emit the id index and string-length arrays.
    pub id_index_arrays: bool,
}

impl TableTemplate {
    /// Starts a template for `schema` in `generation`.
    #[must_use]
    pub fn builder(generation: Generation, schema: &TableSchema) -> TemplateBuilder<'_> {
        TemplateBuilder {
            schema,
            header: TableHeader::new(generation),
            widths: HashMap::new(),
            compression: HashMap::new(),
            sections: Vec::new(),
            id_index_arrays: false,
        }
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.meta.header.generation
    }

    #[must_use]
    pub const fn header(&self) -> &TableHeader {
        &self.meta.header
    }

    /// Index of the first section that is not encrypted.
    #[must_use]
    pub fn first_plain_section(&self) -> Option<usize> {
        if self.sections.is_empty() {
            return Some(0);
        }
        self.sections.iter().position(|s| s.preserved.is_none())
    }

    /// The section `id` is written to: its template section when that one is
    /// plain, otherwise the first plain section.
    pub(crate) fn section_for(&self, id: u32, first_plain: usize) -> usize {
        match self.records.get(&id) {
            Some(meta)
                if self
                    .sections
                    .get(meta.section)
                    .is_some_and(|s| s.preserved.is_none()) =>
            {
                meta.section
            }
            _ => first_plain,
        }
    }

    pub(crate) fn secondary_key(&self, id: u32) -> u32 {
        self.records.get(&id).map_or(0, |m| m.secondary_key)
    }
}

impl RecordSet {
    /// The template that rewrites this table.
    #[must_use]
    pub fn template(&self) -> TableTemplate {
        let strings = self.strings.as_bytes();
        let mut start = 0usize;
        let sections = self
            .sections
            .iter()
            .map(|info| {
                let end = start + info.string_table_len;
                let table = strings.get(start..end).map(<[u8]>::to_vec);
                start = end;
                SectionTemplate {
                    tact_key_hash: info.header.tact_key_hash,
                    preserved: info.encrypted.then(|| PreservedSection {
                        info: info.clone(),
                        strings: table.unwrap_or_default(),
                        min_id: self.meta.header.min_id,
                    }),
                }
            })
            .collect();

        let records = self
            .records
            .iter()
            .map(|r| {
                (
                    r.id,
                    RecordMeta {
                        section: r.section,
                        secondary_key: r.secondary_key,
                    },
                )
            })
            .collect();

        TableTemplate {
            meta: self.meta.clone(),
            sections,
            records,
            id_index_arrays: self.meta.header.max_id != 0,
        }
    }
}

/// Builds a [`TableTemplate`] from a schema.
///
/// Fields are laid out in column order at their type's width unless
/// overridden. A schema without an index column on a generation that stores
/// ids inline gets an id list instead.
#[derive(Debug, Clone)]
pub struct TemplateBuilder<'a> {
    schema: &'a TableSchema,
    header: TableHeader,
    widths: HashMap<String, u32>,
    compression: HashMap<String, ColumnCompression>,
    sections: Vec<u64>,
    id_index_arrays: bool,
}

impl TemplateBuilder<'_> {
    #[must_use]
    pub fn flags(mut self, flags: TableFlags) -> Self {
        self.header.flags = flags;
        self
    }

    #[must_use]
    pub fn table_hash(mut self, hash: u32) -> Self {
        self.header.table_hash = hash;
        self
    }

    #[must_use]
    pub fn layout_hash(mut self, hash: u32) -> Self {
        self.header.layout_hash = hash;
        self
    }

    #[must_use]
    pub fn build_number(mut self, build: u32) -> Self {
        self.header.build = build;
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.header.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn locale(mut self, locale: u32) -> Self {
        self.header.locale = locale;
        self
    }

    /// Stored width in bits of one element of column `name`.
    #[must_use]
    pub fn field_width(mut self, name: impl Into<String>, bits: u32) -> Self {
        self.widths.insert(name.into(), bits);
        self
    }

    /// Compression kind of column `name` (WDC1 and later). Widths and
    /// dictionaries are derived on write; only the kind, immediate flags
    /// and common default are taken from here.
    #[must_use]
    pub fn compression(mut self, name: impl Into<String>, compression: ColumnCompression) -> Self {
        self.compression.insert(name.into(), compression);
        self
    }

    /// Adds a data section (WDC2 and later).
    #[must_use]
    pub fn section(mut self, tact_key_hash: u64) -> Self {
        self.sections.push(tact_key_hash);
        self
    }

    /// WDB2: emit the id index and string-length arrays.
    #[must_use]
    pub fn id_index_arrays(mut self, on: bool) -> Self {
        self.id_index_arrays = on;
        self
    }

    pub fn build(self) -> CodecResult<TableTemplate> {
        self.schema.validate()?;
        let mut header = self.header;
        let generation = header.generation;
        let index_column = self.schema.index_column();
        if has_inline_id(&header) && index_column.is_none() {
            header.flags = header.flags.with(TableFlags::INDEX, true);
        }
        let inline = has_inline_id(&header);

        let mut field_meta = Vec::new();
        let mut column_meta = Vec::new();
        let mut bits = 0usize;
        let mut elements = 0usize;
        let mut id_field = None;

        for column in &self.schema.columns {
            if column.index && generation.has_id_index() && !inline {
                continue;
            }
            if column.non_inline_relation {
                if !generation.has_column_meta() {
                    return Err(CodecError::SchemaMismatch {
                        reason: MismatchReason::RelationNotStored {
                            column: column.name.clone(),
                        },
                    });
                }
                continue;
            }
            let cardinality = match column.arity {
                Arity::Scalar => 1,
                Arity::Array(n) => n as usize,
                Arity::InferredArray => {
                    return Err(CodecError::SchemaMismatch {
                        reason: MismatchReason::CannotInferCardinality {
                            column: column.name.clone(),
                        },
                    })
                }
            };
            let width = match column.value_type {
                ValueType::String => 32,
                ty => self.widths.get(&column.name).copied().unwrap_or(ty.bit_width()),
            };
            if width == 0 || width > 64 || (width % 8 != 0 && !generation.has_column_meta()) {
                return Err(CodecError::Encode(EncodeError::ValueOverflow {
                    field: "field width",
                    value: u64::from(width),
                }));
            }
            if column.index {
                id_field = Some(field_meta.len());
            }

            let mut compression = self
                .compression
                .get(&column.name)
                .copied()
                .unwrap_or(ColumnCompression::None);
            if let ColumnCompression::PalletArray { cardinality: stored, .. } = &mut compression {
                *stored = u32_field("pallet cardinality", cardinality)?;
            }
            let size = width as usize * cardinality;
            field_meta.push(FieldMeta::new(width, u16_field("field offset", bits / 8)?));
            column_meta.push(ColumnMeta {
                record_offset: u16_field("column record offset", bits)?,
                size: u16_field("column size", size)?,
                additional_data_size: 0,
                compression,
            });
            bits += size;
            elements += cardinality;
        }

        let fields = field_meta.len();
        header.field_count = u32_field(
            "field count",
            if generation.has_field_meta() { fields } else { elements },
        )?;
        if generation >= Generation::Wdb6 {
            header.total_field_count = header.field_count;
        }
        header.record_size = u32_field("record size", bits.div_ceil(8))?;
        if inline {
            header.id_index = u16_field("id index", id_field.unwrap_or(0))?;
        }

        let sections = if generation.is_multi_section() {
            let mut hashes = self.sections;
            if hashes.is_empty() {
                hashes.push(0);
            }
            header.section_count = u32_field("section count", hashes.len())?;
            hashes
                .into_iter()
                .map(|tact_key_hash| SectionTemplate {
                    tact_key_hash,
                    preserved: None,
                })
                .collect()
        } else {
            vec![SectionTemplate::default()]
        };

        let mut meta = TableMeta::new(header);
        if generation.has_field_meta() {
            meta.field_meta = field_meta;
        }
        if generation.has_column_meta() {
            meta.column_meta = column_meta;
        }
        Ok(TableTemplate {
            meta,
            sections,
            records: HashMap::new(),
            id_index_arrays: self.id_index_arrays,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::ColumnDescriptor;

    fn schema() -> TableSchema {
        TableSchema::new(
            "Spell",
            vec![
                ColumnDescriptor::scalar("ID", ValueType::U32).index(),
                ColumnDescriptor::scalar("Name", ValueType::String),
                ColumnDescriptor::array("Effects", ValueType::U16, 3),
            ],
        )
        .unwrap()
    }

    #[test]
    fn legacy_counts_elements() {
        let template = TableTemplate::builder(Generation::Wdbc, &schema())
            .build()
            .unwrap();
        assert_eq!(template.header().field_count, 5);
        assert_eq!(template.header().record_size, 4 + 4 + 6);
        assert!(template.meta.field_meta.is_empty());
    }

    #[test]
    fn inline_id_field_index() {
        let template = TableTemplate::builder(Generation::Wdb5, &schema())
            .field_width("ID", 24)
            .build()
            .unwrap();
        let header = template.header();
        assert_eq!(header.field_count, 3);
        assert_eq!(header.id_index, 0);
        assert_eq!(template.meta.field_meta[0].width_bits(), 24);
        assert_eq!(template.meta.field_meta[1].offset, 3);
        assert_eq!(header.record_size, 3 + 4 + 6);
    }

    #[test]
    fn id_list_when_flagged() {
        let template = TableTemplate::builder(Generation::Wdc3, &schema())
            .flags(TableFlags::from_raw(TableFlags::INDEX))
            .compression(
                "Effects",
                ColumnCompression::PalletArray {
                    bit_offset: 0,
                    bit_width: 0,
                    cardinality: 0,
                },
            )
            .build()
            .unwrap();
        assert_eq!(template.header().field_count, 2);
        assert_eq!(template.meta.column_meta.len(), 2);
        assert!(matches!(
            template.meta.column_meta[1].compression,
            ColumnCompression::PalletArray { cardinality: 3, .. }
        ));
        assert_eq!(template.sections.len(), 1);
        assert_eq!(template.header().section_count, 1);
    }

    #[test]
    fn no_index_column_gets_id_list() {
        let schema = TableSchema::new(
            "Plain",
            vec![ColumnDescriptor::scalar("Value", ValueType::U32)],
        )
        .unwrap();
        let template = TableTemplate::builder(Generation::Wdb5, &schema)
            .build()
            .unwrap();
        assert!(template.header().flags.has_index());
    }

    #[test]
    fn odd_width_needs_column_meta() {
        let err = TableTemplate::builder(Generation::Wdb5, &schema())
            .field_width("ID", 20)
            .build()
            .unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)));
    }
}
