//! Compression-parameter derivation for WDC writers.
//!
//! Column metadata, pallet dictionaries and common maps are recomputed from
//! the rows being written. The compression kind of each column comes from
//! the template; widths, offsets and dictionaries come from the data.

use std::collections::HashMap;

use bitstream::Value32;
use schema::TableSchema;
use tracing::debug;
use wire::{ColumnCompression, ColumnMeta, EncodeError};

use crate::column::{elements, field_value, fixed_elements};
use crate::error::{CodecError, CodecResult, ValueReason};
use crate::layout::{Storage, TableLayout};
use crate::value::Row;

/// An insertion-ordered dictionary of value tuples.
///
/// Indices are assigned in first-occurrence order, so the same rows always
/// produce the same dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Pallet {
    values: Vec<Value32>,
    index: HashMap<Vec<Value32>, u32>,
}

impl Pallet {
    /// Returns the tuple's index, appending it if new.
    pub(crate) fn intern(&mut self, tuple: Vec<Value32>) -> u32 {
        let next = self.index.len() as u32;
        *self.index.entry(tuple).or_insert_with_key(|tuple| {
            self.values.extend_from_slice(tuple);
            next
        })
    }

    pub(crate) fn index_of(&self, tuple: &[Value32]) -> Option<u32> {
        self.index.get(tuple).copied()
    }

    /// Number of tuples.
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn values(&self) -> &[Value32] {
        &self.values
    }

    /// Index width in bits.
    pub(crate) fn width(&self) -> u32 {
        ceil_log2(self.len())
    }
}

/// Bits needed to index `n` entries; 0 for one entry or none.
pub(crate) const fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Bits needed by an unsigned value; at least 1.
const fn unsigned_width(raw: u64) -> u32 {
    let bits = u64::BITS - raw.leading_zeros();
    if bits == 0 {
        1
    } else {
        bits
    }
}

/// Bits needed by a signed value: its magnitude plus a sign bit.
const fn signed_width(value: i64) -> u32 {
    let bits = u64::BITS - value.unsigned_abs().leading_zeros() + 1;
    if bits > 64 {
        64
    } else {
        bits
    }
}

/// Derived storage for every physical field.
#[derive(Debug, Default)]
pub(crate) struct DerivedColumns {
    pub column_meta: Vec<ColumnMeta>,
    pub pallets: Vec<Option<Pallet>>,
    /// Per field: `(id, value)` overrides in row order.
    pub commons: Vec<Vec<(u32, Value32)>>,
    pub record_bits: usize,
    pub bitpacked_data_offset: u32,
}

impl DerivedColumns {
    /// Bytes of pallet data, in column order.
    pub(crate) fn pallet_bytes(&self) -> Vec<u8> {
        self.pallets
            .iter()
            .flatten()
            .flat_map(|p| p.values().iter().flat_map(|v| v.to_le_bytes()))
            .collect()
    }

    /// Bytes of common data, in column order.
    pub(crate) fn common_bytes(&self) -> Vec<u8> {
        self.commons
            .iter()
            .flatten()
            .flat_map(|(id, v)| id.to_le_bytes().into_iter().chain(v.to_le_bytes()))
            .collect()
    }

    pub(crate) fn record_size(&self) -> usize {
        self.record_bits.div_ceil(8)
    }
}

pub(crate) fn u16_field(field: &'static str, value: usize) -> CodecResult<u16> {
    u16::try_from(value).map_err(|_| {
        CodecError::Encode(EncodeError::ValueOverflow {
            field,
            value: value as u64,
        })
    })
}

pub(crate) fn u32_field(field: &'static str, value: usize) -> CodecResult<u32> {
    u32::try_from(value).map_err(|_| {
        CodecError::Encode(EncodeError::ValueOverflow {
            field,
            value: value as u64,
        })
    })
}

/// Recomputes column storage from `rows` and updates `layout` with the new
/// widths and bit positions.
///
/// `template_meta` supplies each column's kind, immediate flags and common
/// default.
pub(crate) fn derive_columns(
    layout: &mut TableLayout,
    template_meta: &[ColumnMeta],
    schema: &TableSchema,
    rows: &[Row],
) -> CodecResult<DerivedColumns> {
    let mut derived = DerivedColumns::default();
    let mut sizes = Vec::with_capacity(layout.fields.len());

    for field in 0..layout.fields.len() {
        let plan = layout.fields[field].clone();
        let template = template_meta.get(field).map(|cm| cm.compression);
        let mut pallet = None;
        let mut common = Vec::new();

        let (storage, size) = match plan.storage {
            Storage::Plain | Storage::LegacyCommon { .. } => {
                (Storage::Plain, plan.element_bits as usize * plan.cardinality)
            }
            Storage::Immediate { signed, .. } => {
                let mut width = 1;
                for row in rows {
                    let value = field_value(layout, row, field);
                    for element in elements(schema, &plan, row.id, &value)? {
                        let needed = if signed {
                            signed_width(element.signed_bits().unwrap_or(0))
                        } else {
                            unsigned_width(element.raw_bits().unwrap_or(0))
                        };
                        width = width.max(needed);
                    }
                }
                (Storage::Immediate { width, signed }, width as usize)
            }
            Storage::Common { default } => {
                for row in rows {
                    let value = field_value(layout, row, field);
                    let tuple = fixed_elements(schema, &plan, row.id, &value)?;
                    let first = tuple.first().copied().unwrap_or(default);
                    if tuple.iter().any(|v| *v != first) {
                        return Err(CodecError::InvalidValue {
                            column: schema.columns[plan.column].name.clone(),
                            row_id: row.id,
                            reason: ValueReason::CommonArrayDiffers,
                        });
                    }
                    if first != default {
                        common.push((row.id, first));
                    }
                }
                (Storage::Common { default }, 0)
            }
            Storage::Pallet { .. } | Storage::PalletArray { .. } => {
                let mut dict = Pallet::default();
                for row in rows {
                    let value = field_value(layout, row, field);
                    dict.intern(fixed_elements(schema, &plan, row.id, &value)?);
                }
                let width = dict.width();
                pallet = Some(dict);
                let storage = if matches!(plan.storage, Storage::Pallet { .. }) {
                    Storage::Pallet { width }
                } else {
                    Storage::PalletArray { width }
                };
                (storage, width as usize)
            }
        };

        debug!(field, kind = ?storage.kind(), bits = size, "derived column");
        layout.fields[field].storage = storage;
        sizes.push(size);
        derived.pallets.push(pallet);
        derived.commons.push(common);
        derived.column_meta.push(ColumnMeta {
            record_offset: 0,
            size: u16_field("column size", size)?,
            additional_data_size: 0,
            compression: template.unwrap_or(ColumnCompression::None),
        });
    }

    let mut offset = 0usize;
    let mut bitpacked_start: Option<usize> = None;
    for (field, size) in sizes.iter().enumerate() {
        let storage = layout.fields[field].storage;
        if !layout.sequential {
            layout.fields[field].bit_position = Some(offset);
        }
        derived.column_meta[field].record_offset = u16_field("column record offset", offset)?;
        if matches!(
            storage,
            Storage::Immediate { .. } | Storage::Pallet { .. } | Storage::PalletArray { .. }
        ) {
            bitpacked_start.get_or_insert(offset / 8);
        }
        offset += size;
    }
    derived.record_bits = offset;
    let bitpacked_byte = bitpacked_start.unwrap_or(0);
    derived.bitpacked_data_offset = u32_field("bitpacked data offset", bitpacked_byte)?;

    for field in 0..layout.fields.len() {
        let plan = &layout.fields[field];
        let record_offset = usize::from(derived.column_meta[field].record_offset);
        let bit_offset = u32_field(
            "column bit offset",
            record_offset.saturating_sub(bitpacked_byte * 8),
        )?;
        let template = derived.column_meta[field].compression;
        let (compression, additional) = match plan.storage {
            Storage::Plain | Storage::LegacyCommon { .. } => (ColumnCompression::None, 0),
            Storage::Immediate { width, signed } => {
                let flags = match template {
                    ColumnCompression::Immediate { flags, .. }
                    | ColumnCompression::SignedImmediate { flags, .. } => flags,
                    _ => 0,
                };
                let compression = if matches!(template, ColumnCompression::SignedImmediate { .. })
                    || (signed && !matches!(template, ColumnCompression::Immediate { .. }))
                {
                    ColumnCompression::SignedImmediate {
                        bit_offset,
                        bit_width: width,
                        flags,
                    }
                } else {
                    ColumnCompression::Immediate {
                        bit_offset,
                        bit_width: width,
                        flags,
                    }
                };
                (compression, 0)
            }
            Storage::Common { default } => (
                ColumnCompression::Common { default },
                derived.commons[field].len() * 8,
            ),
            Storage::Pallet { width } => {
                let len = derived.pallets[field].as_ref().map_or(0, Pallet::len);
                (
                    ColumnCompression::Pallet {
                        bit_offset,
                        bit_width: width,
                        cardinality: 0,
                    },
                    len * 4,
                )
            }
            Storage::PalletArray { width } => {
                let len = derived.pallets[field].as_ref().map_or(0, Pallet::len);
                (
                    ColumnCompression::PalletArray {
                        bit_offset,
                        bit_width: width,
                        cardinality: u32_field("pallet cardinality", plan.cardinality)?,
                    },
                    len * 4 * plan.cardinality,
                )
            }
        };
        derived.column_meta[field].compression = compression;
        derived.column_meta[field].additional_data_size =
            u32_field("additional data size", additional)?;
    }

    Ok(derived)
}
