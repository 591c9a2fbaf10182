//! Copy-row collapsing.
//!
//! Rows whose record bytes (ignoring the inline id) and out-of-record values
//! match an earlier row become copy-table entries pointing at it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::trace;
use wire::{CopyEntry, Generation, TableHeader};

use crate::column::EncodedRow;
use crate::layout::{Storage, TableLayout};
use crate::options::WriteOptions;

#[derive(Debug, Default)]
pub(crate) struct Collapsed {
    pub primaries: Vec<EncodedRow>,
    pub copies: Vec<CopyEntry>,
}

impl Collapsed {
    /// Every row kept as a record.
    pub(crate) fn keep_all(rows: Vec<EncodedRow>) -> Self {
        Self {
            primaries: rows,
            copies: Vec::new(),
        }
    }
}

/// Whether collapsing applies to a table with this header and record size.
pub(crate) fn applies(
    layout: &TableLayout,
    header: &TableHeader,
    record_size: usize,
    options: &WriteOptions,
) -> bool {
    let id_list = if header.flags.has_index() { 4 } else { 0 };
    options.collapse_copies
        && header.generation >= Generation::Wdb5
        && !header.flags.is_sparse()
        && layout.relation_column.is_none()
        && record_size + id_list > 8
}

/// Bit span of the inline id inside a record.
pub(crate) fn id_bits(layout: &TableLayout) -> Option<(usize, u32)> {
    let plan = layout.id_field()?;
    let start = plan.bit_position?;
    let width = match plan.storage {
        Storage::Plain => plan.element_bits,
        Storage::Immediate { width, .. }
        | Storage::Pallet { width }
        | Storage::PalletArray { width } => width,
        Storage::Common { .. } | Storage::LegacyCommon { .. } => return None,
    };
    Some((start, width))
}

/// Splits `rows` into records and copies of earlier records.
pub(crate) fn collapse(rows: Vec<EncodedRow>, id_bits: Option<(usize, u32)>) -> Collapsed {
    let total = rows.len();
    let mut seen: HashMap<Vec<u8>, u32> = HashMap::with_capacity(total);
    let mut out = Collapsed::default();
    for row in rows {
        match seen.entry(key(&row, id_bits)) {
            Entry::Occupied(source) => out.copies.push(CopyEntry {
                new_id: row.id,
                source_id: *source.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(row.id);
                out.primaries.push(row);
            }
        }
    }
    trace!(rows = total, copies = out.copies.len(), "collapsed copies");
    out
}

fn key(row: &EncodedRow, id_bits: Option<(usize, u32)>) -> Vec<u8> {
    let mut key = row.writer.as_bytes().to_vec();
    if let Some((start, width)) = id_bits {
        for bit in start..start + width as usize {
            if let Some(byte) = key.get_mut(bit / 8) {
                *byte &= !(1 << (bit % 8));
            }
        }
    }
    key.extend_from_slice(&row.extra);
    key
}
