//! Slot plans: a schema resolved against a table's physical layout.
//!
//! Resolution runs once per table. Each schema column becomes a slot that
//! either reads a physical field, takes the record id, or takes the record's
//! relationship-map value. Decode and encode then walk slots by position.

use bitstream::Value32;
use schema::{Arity, ColumnDescriptor, TableSchema, ValueType};
use wire::{ColumnCompression, CompressionKind, Generation, TableHeader};

use crate::error::{CodecError, CodecResult, MismatchReason, UnsupportedReason};
use crate::record::TableMeta;

/// Where a schema column's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// The record id (id list, sparse index or implicit position).
    Id,
    /// The relationship map.
    Relation,
    /// A physical field.
    Field(usize),
}

/// How a field's elements are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Storage {
    /// Raw bits of `element_bits` per element, or a string.
    Plain,
    Immediate { width: u32, signed: bool },
    Common { default: Value32 },
    Pallet { width: u32 },
    PalletArray { width: u32 },
    /// WDB6 out-of-record column with its common-block type byte.
    LegacyCommon { kind: u8 },
}

impl Storage {
    pub(crate) const fn kind(self) -> CompressionKind {
        match self {
            Self::Plain => CompressionKind::None,
            Self::Immediate { signed: true, .. } => CompressionKind::SignedImmediate,
            Self::Immediate { .. } => CompressionKind::Immediate,
            Self::Common { .. } | Self::LegacyCommon { .. } => CompressionKind::Common,
            Self::Pallet { .. } => CompressionKind::Pallet,
            Self::PalletArray { .. } => CompressionKind::PalletArray,
        }
    }

    /// `true` when the field occupies no record bits.
    pub(crate) const fn is_out_of_record(self) -> bool {
        matches!(self, Self::Common { .. } | Self::LegacyCommon { .. })
    }
}

/// One physical field as mapped by the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldPlan {
    /// Schema column index.
    pub column: usize,
    pub value_type: ValueType,
    pub cardinality: usize,
    /// The column materializes as [`Value::Array`](crate::Value::Array).
    pub array: bool,
    /// Width of one element for plain storage.
    pub element_bits: u32,
    /// Start bit inside the record; `None` when fields are read in sequence.
    pub bit_position: Option<usize>,
    pub storage: Storage,
}

/// A schema resolved against one table's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableLayout {
    pub generation: Generation,
    pub slots: Vec<Slot>,
    pub fields: Vec<FieldPlan>,
    /// Physical field carrying the record id.
    pub inline_id: Option<usize>,
    pub index_column: Option<usize>,
    pub relation_column: Option<usize>,
    /// Fields follow each other with no fixed offsets.
    pub sequential: bool,
    /// Strings are stored inline in the record.
    pub inline_strings: bool,
}

/// `true` if ids live inside the record bytes for this header.
pub(crate) const fn has_inline_id(header: &TableHeader) -> bool {
    header.generation.has_id_index() && !header.flags.is_sparse() && !header.flags.has_index()
}

/// `true` if the table uses variable-length records.
pub(crate) const fn is_sparse(header: &TableHeader) -> bool {
    header.generation.has_id_index() && header.flags.is_sparse()
}

impl TableLayout {
    /// Resolves `schema` against `meta`.
    pub(crate) fn resolve(meta: &TableMeta, schema: &TableSchema) -> CodecResult<Self> {
        schema.validate()?;
        let header = &meta.header;
        let generation = header.generation;
        let sparse = is_sparse(header);
        let inline_id = has_inline_id(header);

        let mut layout = Self {
            generation,
            slots: Vec::with_capacity(schema.columns.len()),
            fields: Vec::new(),
            inline_id: None,
            index_column: schema.index_column(),
            relation_column: schema.relation_column(),
            sequential: sparse || !generation.has_field_meta(),
            inline_strings: sparse,
        };

        for (position, column) in schema.columns.iter().enumerate() {
            if column.index && generation.has_id_index() && !inline_id {
                layout.slots.push(Slot::Id);
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
                layout.slots.push(Slot::Relation);
                continue;
            }
            let field = layout.fields.len();
            let plan = match generation {
                Generation::Wdbc | Generation::Wdb2 => fixed_plan(meta, &layout, position, column)?,
                Generation::Wdb5 | Generation::Wdb6 => {
                    field_meta_plan(meta, field, position, column, sparse)?
                }
                Generation::Wdc1 | Generation::Wdc2 | Generation::Wdc3 => {
                    column_meta_plan(meta, field, position, column, sparse)?
                }
            };
            layout.fields.push(plan);
            layout.slots.push(Slot::Field(field));
        }

        layout.check_field_count(header)?;

        if inline_id {
            let id_field = usize::from(header.id_index);
            if let Some(index) = layout.index_column {
                if let Slot::Field(field) = layout.slots[index] {
                    if field != id_field {
                        return Err(CodecError::SchemaMismatch {
                            reason: MismatchReason::IdFieldPosition {
                                expected: id_field,
                                actual: field,
                            },
                        });
                    }
                }
            }
            layout.inline_id = Some(id_field);
        }
        Ok(layout)
    }

    fn check_field_count(&self, header: &TableHeader) -> CodecResult<()> {
        let (expected, actual) = match self.generation {
            Generation::Wdbc | Generation::Wdb2 => (
                header.field_count as usize,
                self.fields.iter().map(|f| f.cardinality).sum(),
            ),
            Generation::Wdb6 => (header.total_field_count as usize, self.fields.len()),
            _ => (header.field_count as usize, self.fields.len()),
        };
        if expected != actual {
            return Err(CodecError::SchemaMismatch {
                reason: MismatchReason::FieldCount { expected, actual },
            });
        }
        Ok(())
    }

    /// The plan for the field holding the record id, if ids are inline.
    pub(crate) fn id_field(&self) -> Option<&FieldPlan> {
        self.inline_id.and_then(|f| self.fields.get(f))
    }
}

fn unsupported(
    column: &ColumnDescriptor,
    kind: CompressionKind,
    reason: UnsupportedReason,
) -> CodecError {
    CodecError::UnsupportedColumn {
        column: column.name.clone(),
        value_type: column.value_type,
        kind,
        reason,
    }
}

/// Rejects type/compression pairs no generation can store.
pub(crate) fn check_combination(column: &ColumnDescriptor, storage: Storage) -> CodecResult<()> {
    let kind = storage.kind();
    let ty = column.value_type;
    let array = column.arity.is_array();
    match storage {
        Storage::Plain => Ok(()),
        Storage::LegacyCommon { .. } if ty == ValueType::String => Ok(()),
        _ if ty == ValueType::String => {
            Err(unsupported(column, kind, UnsupportedReason::StringCompressed))
        }
        Storage::Common { .. }
        | Storage::LegacyCommon { .. }
        | Storage::Pallet { .. }
        | Storage::PalletArray { .. }
            if ty.is_64bit() =>
        {
            Err(unsupported(column, kind, UnsupportedReason::WideDictionary))
        }
        Storage::Immediate { .. } | Storage::Pallet { .. } | Storage::LegacyCommon { .. }
            if array =>
        {
            Err(unsupported(column, kind, UnsupportedReason::ArrayNotAllowed))
        }
        Storage::PalletArray { .. } if !array => {
            Err(unsupported(column, kind, UnsupportedReason::ScalarPalletArray))
        }
        _ => Ok(()),
    }
}

fn cannot_infer(column: &ColumnDescriptor) -> CodecError {
    CodecError::SchemaMismatch {
        reason: MismatchReason::CannotInferCardinality {
            column: column.name.clone(),
        },
    }
}

fn cardinality_or(column: &ColumnDescriptor, inferred: Option<usize>) -> CodecResult<usize> {
    match column.arity {
        Arity::Scalar => Ok(1),
        Arity::Array(n) => Ok(n as usize),
        Arity::InferredArray => inferred.filter(|&n| n > 0).ok_or_else(|| cannot_infer(column)),
    }
}

/// WDBC/WDB2: every element is a fixed field of its type's width.
fn fixed_plan(
    meta: &TableMeta,
    layout: &TableLayout,
    position: usize,
    column: &ColumnDescriptor,
) -> CodecResult<FieldPlan> {
    let width = column.value_type.byte_width();
    let inferred = if column.arity == Arity::InferredArray {
        let used: usize = layout
            .fields
            .iter()
            .map(|f| f.cardinality * f.value_type.byte_width())
            .sum();
        let remaining = (meta.header.record_size as usize).saturating_sub(used);
        (remaining % width == 0).then_some(remaining / width)
    } else {
        None
    };
    Ok(FieldPlan {
        column: position,
        value_type: column.value_type,
        cardinality: cardinality_or(column, inferred)?,
        array: column.arity.is_array(),
        element_bits: column.value_type.bit_width(),
        bit_position: None,
        storage: Storage::Plain,
    })
}

/// WDB5/WDB6: field meta gives width and byte offset; WDB6 adds common columns.
fn field_meta_plan(
    meta: &TableMeta,
    field: usize,
    position: usize,
    column: &ColumnDescriptor,
    sparse: bool,
) -> CodecResult<FieldPlan> {
    let header = &meta.header;
    if header.generation == Generation::Wdb6 && field >= header.field_count as usize {
        let kind = meta
            .common_types
            .get(field)
            .copied()
            .unwrap_or_else(|| common_type_for(column.value_type));
        let storage = Storage::LegacyCommon { kind };
        check_combination(column, storage)?;
        return Ok(FieldPlan {
            column: position,
            value_type: column.value_type,
            cardinality: 1,
            array: false,
            element_bits: column.value_type.bit_width(),
            bit_position: None,
            storage,
        });
    }

    let Some(fm) = meta.field_meta.get(field) else {
        return Err(CodecError::SchemaMismatch {
            reason: MismatchReason::FieldCount {
                expected: meta.field_meta.len(),
                actual: field + 1,
            },
        });
    };
    let element_bits = if column.value_type == ValueType::String {
        32
    } else {
        fm.width_bits()
    };
    let inferred = {
        let next = meta
            .field_meta
            .get(field + 1)
            .map_or(header.record_size as usize, |n| usize::from(n.offset));
        let span = next.saturating_sub(usize::from(fm.offset));
        let width = (element_bits as usize).div_ceil(8).max(1);
        Some(span / width)
    };
    Ok(FieldPlan {
        column: position,
        value_type: column.value_type,
        cardinality: cardinality_or(column, inferred)?,
        array: column.arity.is_array(),
        element_bits,
        bit_position: (!sparse).then(|| usize::from(fm.offset) * 8),
        storage: Storage::Plain,
    })
}

/// WDC1..WDC3: column meta gives bit offset and compression.
fn column_meta_plan(
    meta: &TableMeta,
    field: usize,
    position: usize,
    column: &ColumnDescriptor,
    sparse: bool,
) -> CodecResult<FieldPlan> {
    let Some(cm) = meta.column_meta.get(field) else {
        return Err(CodecError::SchemaMismatch {
            reason: MismatchReason::FieldCount {
                expected: meta.column_meta.len(),
                actual: field + 1,
            },
        });
    };
    let element_bits = plain_width(meta, field, column.value_type);
    let storage = match cm.compression {
        ColumnCompression::None => Storage::Plain,
        ColumnCompression::Immediate { bit_width, .. }
        | ColumnCompression::SignedImmediate { bit_width, .. } => Storage::Immediate {
            width: bit_width,
            signed: cm.compression.is_signed(),
        },
        ColumnCompression::Common { default } => Storage::Common { default },
        ColumnCompression::Pallet { bit_width, .. } => Storage::Pallet { width: bit_width },
        ColumnCompression::PalletArray { bit_width, .. } => {
            Storage::PalletArray { width: bit_width }
        }
    };
    check_combination(column, storage)?;

    let cardinality = match (cm.compression, storage) {
        (ColumnCompression::PalletArray { cardinality, .. }, _) => {
            let stored = cardinality as usize;
            if let Arity::Array(n) = column.arity {
                if n as usize != stored {
                    return Err(CodecError::SchemaMismatch {
                        reason: MismatchReason::Cardinality {
                            column: column.name.clone(),
                            declared: n as usize,
                            stored,
                        },
                    });
                }
            }
            stored
        }
        (_, Storage::Plain) => cardinality_or(
            column,
            Some(usize::from(cm.size) / (element_bits as usize).max(1)),
        )?,
        _ => cardinality_or(column, None)?,
    };

    Ok(FieldPlan {
        column: position,
        value_type: column.value_type,
        cardinality,
        array: column.arity.is_array(),
        element_bits,
        bit_position: (!sparse).then_some(usize::from(cm.record_offset)),
        storage,
    })
}

/// Element width of an uncompressed WDC column.
fn plain_width(meta: &TableMeta, field: usize, value_type: ValueType) -> u32 {
    if value_type == ValueType::String {
        return 32;
    }
    match meta.field_meta.get(field).map(|fm| fm.width_bits()) {
        Some(bits @ 1..=64) => bits,
        _ => value_type.bit_width(),
    }
}

/// WDB6 common-block value types.
pub(crate) const COMMON_TYPE_STRING: u8 = 0;
pub(crate) const COMMON_TYPE_U16: u8 = 1;
pub(crate) const COMMON_TYPE_U8: u8 = 2;
pub(crate) const COMMON_TYPE_F32: u8 = 3;
pub(crate) const COMMON_TYPE_INT: u8 = 4;

/// Byte size of one WDB6 common value, if the type byte is known.
pub(crate) const fn common_value_size(kind: u8) -> Option<usize> {
    match kind {
        COMMON_TYPE_STRING | COMMON_TYPE_F32 | COMMON_TYPE_INT => Some(4),
        COMMON_TYPE_U16 => Some(2),
        COMMON_TYPE_U8 => Some(1),
        _ => None,
    }
}

/// The WDB6 common-block type byte for a column type.
pub(crate) const fn common_type_for(value_type: ValueType) -> u8 {
    match value_type {
        ValueType::String => COMMON_TYPE_STRING,
        ValueType::I16 | ValueType::U16 => COMMON_TYPE_U16,
        ValueType::I8 | ValueType::U8 => COMMON_TYPE_U8,
        ValueType::F32 => COMMON_TYPE_F32,
        _ => COMMON_TYPE_INT,
    }
}
