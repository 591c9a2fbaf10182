//! Per-kind column codecs.
//!
//! Decoding walks a record's slots and reads each field according to its
//! [`Storage`]; encoding mirrors it field for field. Out-of-record kinds
//! (common and WDB6 common columns) touch no record bits.

use std::borrow::Cow;

use bitstream::{BitError, BitReader, BitWriter, Value32};
use schema::{TableSchema, ValueType};
use wire::{ColumnCompression, DecodeError, Region};

use crate::derive::Pallet;
use crate::error::{CodecError, CodecResult, ValueReason};
use crate::layout::{FieldPlan, Slot, Storage, TableLayout};
use crate::record::{RawRecord, RecordSet, TableMeta};
use crate::strings::StringTableBuilder;
use crate::value::{Row, Value};

fn pallet_out_of_range() -> CodecError {
    CodecError::Wire(DecodeError::InvalidLayout {
        region: Region::PalletData,
        reason: "pallet index out of range",
    })
}

/// Decodes one record into a row.
pub(crate) fn decode_record(
    set: &RecordSet,
    layout: &TableLayout,
    schema: &TableSchema,
    record: &RawRecord,
) -> CodecResult<Row> {
    let bytes = set.record_bytes(record)?;
    let mut r = BitReader::new(bytes);
    let mut values = Vec::with_capacity(layout.slots.len());

    for (position, slot) in layout.slots.iter().enumerate() {
        let value_type = schema.columns[position].value_type;
        let value = match *slot {
            Slot::Id => Value::from_raw(value_type, u64::from(record.id)),
            Slot::Relation => Value::from_raw(value_type, u64::from(record.relation.unwrap_or(0))),
            Slot::Field(field) => {
                let decoder = FieldDecoder {
                    set,
                    layout,
                    schema,
                    record,
                    field,
                };
                decoder.decode(&mut r)?
            }
        };
        values.push(value);
    }

    let mut id = record.id;
    if let Some(index) = layout.index_column {
        if layout.inline_id.is_some() {
            // Copy rows share their source's bytes but keep their own id.
            let value_type = schema.columns[index].value_type;
            values[index] = Value::from_raw(value_type, u64::from(record.id));
        } else if !layout.generation.has_id_index() {
            id = values[index].as_key().unwrap_or(record.id);
        }
    }
    Ok(Row { id, values })
}

struct FieldDecoder<'a> {
    set: &'a RecordSet,
    layout: &'a TableLayout,
    schema: &'a TableSchema,
    record: &'a RawRecord,
    field: usize,
}

impl FieldDecoder<'_> {
    fn plan(&self) -> &FieldPlan {
        &self.layout.fields[self.field]
    }

    fn decode(&self, r: &mut BitReader<'_>) -> CodecResult<Value> {
        let plan = self.plan();
        if !plan.storage.is_out_of_record() {
            if let Some(pos) = plan.bit_position {
                r.seek_bits(pos)?;
            }
        }

        let elements = match plan.storage {
            Storage::Plain => (0..plan.cardinality)
                .map(|_| self.read_plain(r))
                .collect::<CodecResult<Vec<_>>>()?,
            Storage::Immediate { width, signed } => {
                let raw = if signed {
                    r.read_bits_signed(width)? as u64
                } else {
                    r.read_bits(width)?
                };
                vec![Value::from_raw(plan.value_type, raw)]
            }
            Storage::Common { default } => {
                let value = self
                    .set
                    .commons
                    .get(self.field)
                    .and_then(|m| m.get(&self.record.id))
                    .copied()
                    .unwrap_or(default);
                vec![Value::from_fixed(plan.value_type, value); plan.cardinality]
            }
            Storage::Pallet { width } | Storage::PalletArray { width } => {
                let index = r.read_bits(width)? as usize;
                let base = index
                    .checked_mul(plan.cardinality)
                    .ok_or_else(pallet_out_of_range)?;
                let values = self
                    .set
                    .pallets
                    .get(self.field)
                    .and_then(|p| p.get(base..base + plan.cardinality))
                    .ok_or_else(pallet_out_of_range)?;
                values
                    .iter()
                    .map(|&v| Value::from_fixed(plan.value_type, v))
                    .collect()
            }
            Storage::LegacyCommon { .. } => {
                let raw = self
                    .set
                    .legacy_commons
                    .get(self.field)
                    .and_then(|m| m.get(&self.record.id))
                    .copied()
                    .unwrap_or(Value32::ZERO);
                if plan.value_type == ValueType::String {
                    vec![Value::String(self.resolve(raw.as_u32(), 0)?)]
                } else {
                    vec![Value::from_fixed(plan.value_type, raw)]
                }
            }
        };

        Ok(collapse(plan.array, elements))
    }

    fn read_plain(&self, r: &mut BitReader<'_>) -> CodecResult<Value> {
        let plan = self.plan();
        if plan.value_type != ValueType::String {
            return Ok(Value::from_raw(plan.value_type, r.read_bits(plan.element_bits)?));
        }
        if self.layout.inline_strings {
            let bytes = r.read_cstring()?;
            return Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()));
        }
        let field_byte = r.bit_position() / 8;
        let stored = r.read_bits(32)? as u32;
        Ok(Value::String(self.resolve(stored, field_byte)?))
    }

    fn resolve(&self, stored: u32, field_byte: usize) -> CodecResult<String> {
        let set = self.set;
        let resolved = if self.layout.generation.has_relative_strings()
            && !self.plan().storage.is_out_of_record()
        {
            if stored == 0 {
                Some(String::new())
            } else {
                set.strings.get_relative(
                    stored,
                    self.record.region_position + field_byte,
                    set.records_len,
                )
            }
        } else {
            set.strings.get(stored as usize)
        };
        resolved.ok_or_else(|| CodecError::InvalidValue {
            column: self.schema.columns[self.plan().column].name.clone(),
            row_id: self.record.id,
            reason: ValueReason::UnresolvedString {
                offset: i64::from(stored),
            },
        })
    }
}

fn collapse(array: bool, mut elements: Vec<Value>) -> Value {
    if array {
        Value::Array(elements)
    } else {
        elements.pop().unwrap_or(Value::U32(0))
    }
}

/// Reads the id stored inside a record, without a schema.
pub(crate) fn read_inline_id(
    meta: &TableMeta,
    pallets: &[Vec<Value32>],
    bytes: &[u8],
) -> CodecResult<u32> {
    let field = usize::from(meta.header.id_index);
    let mut r = BitReader::new(bytes);
    let missing = || {
        CodecError::Wire(DecodeError::InvalidLayout {
            region: Region::FieldMeta,
            reason: "id field index out of range",
        })
    };

    if meta.header.generation.has_column_meta() {
        let cm = meta.column_meta.get(field).ok_or_else(missing)?;
        r.seek_bits(usize::from(cm.record_offset))?;
        let raw = match cm.compression {
            ColumnCompression::None => {
                let width = match meta.field_meta.get(field).map(|fm| fm.width_bits()) {
                    Some(bits @ 1..=32) => bits,
                    _ => 32,
                };
                r.read_bits(width)?
            }
            ColumnCompression::Immediate { bit_width, .. }
            | ColumnCompression::SignedImmediate { bit_width, .. } => r.read_bits(bit_width)?,
            ColumnCompression::Pallet { bit_width, .. }
            | ColumnCompression::PalletArray { bit_width, .. } => {
                let index = r.read_bits(bit_width)? as usize;
                let value = pallets
                    .get(field)
                    .and_then(|p| p.get(index))
                    .ok_or_else(pallet_out_of_range)?;
                u64::from(value.as_u32())
            }
            ColumnCompression::Common { default } => u64::from(default.as_u32()),
        };
        Ok(raw as u32)
    } else {
        let fm = meta.field_meta.get(field).ok_or_else(missing)?;
        r.seek_bits(usize::from(fm.offset) * 8)?;
        Ok(r.read_bits(fm.width_bits().min(32))? as u32)
    }
}

/// One serialized row, ready for copy collapsing and emission.
#[derive(Debug)]
pub(crate) struct EncodedRow {
    pub id: u32,
    pub writer: BitWriter,
    /// Bit offset inside the row and absolute string-table position, for
    /// field-relative fixups.
    pub string_refs: Vec<(usize, u32)>,
    /// Sum of the row's string byte lengths.
    pub string_bytes: usize,
    /// Out-of-record values, folded into the copy-collapse key.
    pub extra: Vec<u8>,
    pub relation: u32,
}

/// Shared state for encoding rows.
pub(crate) struct RowEncoder<'a> {
    pub layout: &'a TableLayout,
    pub schema: &'a TableSchema,
    pub pallets: &'a [Option<Pallet>],
    pub strings: &'a mut StringTableBuilder,
    /// Fixed record size; sparse rows pad to `sparse_alignment` instead.
    pub record_size: Option<usize>,
    pub sparse_alignment: usize,
}

/// The value `field` should store for `row`; the inline id field always
/// stores the row id.
pub(crate) fn field_value<'r>(layout: &TableLayout, row: &'r Row, field: usize) -> Cow<'r, Value> {
    let plan = &layout.fields[field];
    if layout.inline_id == Some(field) {
        return Cow::Owned(Value::from_raw(plan.value_type, u64::from(row.id)));
    }
    Cow::Borrowed(&row.values[plan.column])
}

/// Flattens a column value into its elements, checking arity and type.
pub(crate) fn elements<'v>(
    schema: &TableSchema,
    plan: &FieldPlan,
    row_id: u32,
    value: &'v Value,
) -> CodecResult<Vec<&'v Value>> {
    let column = &schema.columns[plan.column];
    let invalid = |reason| CodecError::InvalidValue {
        column: column.name.clone(),
        row_id,
        reason,
    };
    let items: Vec<&Value> = match (plan.array, value) {
        (true, Value::Array(items)) => items.iter().collect(),
        (false, Value::Array(_)) | (true, _) => {
            return Err(invalid(ValueReason::TypeMismatch {
                expected: plan.value_type,
                found: value.type_name(),
            }))
        }
        (false, scalar) => vec![scalar],
    };
    if items.len() != plan.cardinality {
        return Err(invalid(ValueReason::WrongElementCount {
            expected: plan.cardinality,
            found: items.len(),
        }));
    }
    if let Some(bad) = items.iter().find(|v| !v.is_type(plan.value_type)) {
        return Err(invalid(ValueReason::TypeMismatch {
            expected: plan.value_type,
            found: bad.type_name(),
        }));
    }
    Ok(items)
}

/// Fixed-box patterns of a field's elements.
pub(crate) fn fixed_elements(
    schema: &TableSchema,
    plan: &FieldPlan,
    row_id: u32,
    value: &Value,
) -> CodecResult<Vec<Value32>> {
    elements(schema, plan, row_id, value)?
        .into_iter()
        .map(|v| {
            v.to_fixed()
                .map(|fixed| fixed.truncated(plan.value_type.byte_width()))
                .ok_or_else(|| CodecError::InvalidValue {
                    column: schema.columns[plan.column].name.clone(),
                    row_id,
                    reason: ValueReason::TypeMismatch {
                        expected: plan.value_type,
                        found: v.type_name(),
                    },
                })
        })
        .collect()
}

impl RowEncoder<'_> {
    pub(crate) fn encode(&mut self, row: &Row) -> CodecResult<EncodedRow> {
        if row.values.len() != self.schema.columns.len() {
            return Err(CodecError::InvalidValue {
                column: self.schema.name.clone(),
                row_id: row.id,
                reason: ValueReason::ColumnCount {
                    expected: self.schema.columns.len(),
                    found: row.values.len(),
                },
            });
        }

        let mut out = EncodedRow {
            id: row.id,
            writer: BitWriter::with_capacity(self.record_size.unwrap_or(16)),
            string_refs: Vec::new(),
            string_bytes: 0,
            extra: Vec::new(),
            relation: 0,
        };

        for (position, slot) in self.layout.slots.iter().enumerate() {
            match *slot {
                Slot::Id => {}
                Slot::Relation => out.relation = row.values[position].as_key().unwrap_or(0),
                Slot::Field(field) => self.encode_field(row, field, &mut out)?,
            }
        }

        match self.record_size {
            Some(size) => {
                out.writer.align_to_byte();
                let len = out.writer.byte_len();
                if len > size {
                    return Err(CodecError::RoundTripMismatch {
                        what: "record size",
                        expected: size,
                        actual: len,
                    });
                }
                out.writer.write_bytes(&vec![0; size - len])?;
            }
            None => out.writer.resize_to_multiple(self.sparse_alignment),
        }
        Ok(out)
    }

    fn encode_field(&mut self, row: &Row, field: usize, out: &mut EncodedRow) -> CodecResult<()> {
        let plan = &self.layout.fields[field];
        let value = field_value(self.layout, row, field);
        let w = &mut out.writer;

        if !plan.storage.is_out_of_record() {
            if let Some(pos) = plan.bit_position {
                let at = w.bits_written();
                if at > pos {
                    return Err(CodecError::RoundTripMismatch {
                        what: "field bit position",
                        expected: pos,
                        actual: at,
                    });
                }
                for _ in at..pos {
                    w.write_bit(false);
                }
            }
        }

        let column = &self.schema.columns[plan.column];
        let does_not_fit = |bits: u32, value: u64| CodecError::InvalidValue {
            column: column.name.clone(),
            row_id: row.id,
            reason: ValueReason::DoesNotFit { bits, value },
        };

        match plan.storage {
            Storage::Plain => {
                for element in elements(self.schema, plan, row.id, &value)? {
                    if let Value::String(s) = element {
                        out.string_bytes += s.len();
                        if self.layout.inline_strings {
                            w.write_cstring(s.as_bytes())?;
                        } else {
                            let offset = self.strings.intern(s)?;
                            out.string_refs.push((w.bits_written(), offset));
                            w.write_bits(u64::from(offset), 32)?;
                        }
                    } else {
                        let raw = element.raw_bits().unwrap_or(0);
                        w.write_bits(raw, plan.element_bits).map_err(|e| match e {
                            BitError::ValueOutOfRange { value, bits } => does_not_fit(bits, value),
                            other => other.into(),
                        })?;
                    }
                }
            }
            Storage::Immediate { width, signed } => {
                let element = elements(self.schema, plan, row.id, &value)?[0];
                let result = if signed {
                    w.write_bits_signed(element.signed_bits().unwrap_or(0), width)
                } else {
                    w.write_bits(element.raw_bits().unwrap_or(0), width)
                };
                result.map_err(|e| match e {
                    BitError::ValueOutOfRange { value, bits } => does_not_fit(bits, value),
                    other => other.into(),
                })?;
            }
            Storage::Pallet { width } | Storage::PalletArray { width } => {
                let tuple = fixed_elements(self.schema, plan, row.id, &value)?;
                let index = self
                    .pallets
                    .get(field)
                    .and_then(Option::as_ref)
                    .and_then(|p| p.index_of(&tuple))
                    .ok_or_else(pallet_out_of_range)?;
                w.write_bits(u64::from(index), width)?;
            }
            Storage::Common { .. } => {
                for fixed in fixed_elements(self.schema, plan, row.id, &value)? {
                    out.extra.extend_from_slice(&fixed.to_le_bytes());
                }
            }
            Storage::LegacyCommon { .. } => {
                if let Value::String(s) = value.as_ref() {
                    out.extra.extend_from_slice(s.as_bytes());
                    out.extra.push(0);
                } else {
                    for fixed in fixed_elements(self.schema, plan, row.id, &value)? {
                        out.extra.extend_from_slice(&fixed.to_le_bytes());
                    }
                }
            }
        }
        Ok(())
    }
}
