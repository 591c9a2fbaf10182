//! Inspection and debugging tools for WDC table files.
//!
//! This crate provides utilities for understanding what a table file holds:
//!
//! - Summarize the header and every data section
//! - Decode rows into JSON against a schema
//! - Check that decode followed by encode reproduces the file
//!
//! Every report is `Serialize`, so the binary can print it either as JSON
//! or as the plain-text form from [`format_inspect_pretty`].

use std::fmt::Write as _;

use codec::{read_table, write_table, CodecResult, ReadOptions, RecordSet, Value, WriteOptions};
use schema::TableSchema;
use serde::Serialize;
use serde_json::{json, Map};

/// Header and per-section summary of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub generation: String,
    pub record_count: u32,
    pub field_count: u32,
    pub record_size: u32,
    pub flags: u16,
    pub table_hash: u32,
    pub layout_hash: u32,
    pub min_id: u32,
    pub max_id: u32,
    /// Records located across plain sections, copies included.
    pub located_records: usize,
    pub sections: Vec<SectionReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionReport {
    pub index: usize,
    pub tact_key_hash: u64,
    pub file_offset: u32,
    pub record_count: u32,
    pub string_table_len: usize,
    pub copies: usize,
    pub encrypted: bool,
}

/// Reads `bytes` and summarizes the table.
pub fn inspect_table(bytes: &[u8], options: &ReadOptions) -> CodecResult<InspectReport> {
    let set = read_table(bytes.to_vec(), options)?;
    Ok(inspect(&set))
}

/// Summarizes an already read table.
pub fn inspect(set: &RecordSet) -> InspectReport {
    let header = set.header();
    InspectReport {
        generation: header.generation.to_string(),
        record_count: header.record_count,
        field_count: header.field_count,
        record_size: header.record_size,
        flags: header.flags.raw(),
        table_hash: header.table_hash,
        layout_hash: header.layout_hash,
        min_id: header.min_id,
        max_id: header.max_id,
        located_records: set.len(),
        sections: set
            .sections()
            .iter()
            .enumerate()
            .map(|(index, s)| SectionReport {
                index,
                tact_key_hash: s.header.tact_key_hash,
                file_offset: s.header.file_offset,
                record_count: s.header.record_count,
                string_table_len: s.string_table_len,
                copies: s.copy_table.len(),
                encrypted: s.encrypted,
            })
            .collect(),
    }
}

/// Renders a report for terminal output.
pub fn format_inspect_pretty(report: &InspectReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} records: {} fields: {} record_size: {} flags: 0x{:04x}",
        report.generation, report.record_count, report.field_count, report.record_size, report.flags
    );
    let _ = writeln!(
        out,
        "table_hash: 0x{:08x} layout_hash: 0x{:08x} ids: {}..={}",
        report.table_hash, report.layout_hash, report.min_id, report.max_id
    );
    let _ = writeln!(out, "located records: {}", report.located_records);
    let _ = writeln!(out, "sections:");
    for s in &report.sections {
        let state = if s.encrypted { " encrypted" } else { "" };
        let _ = writeln!(
            out,
            "  #{} @{}: {} records, {} copies, {} string bytes, key 0x{:016x}{state}",
            s.index, s.file_offset, s.record_count, s.copies, s.string_table_len, s.tact_key_hash
        );
    }
    out
}

/// A value as JSON; arrays keep their element order.
pub fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::I8(v) => json!(v),
        Value::U8(v) => json!(v),
        Value::I16(v) => json!(v),
        Value::U16(v) => json!(v),
        Value::I32(v) => json!(v),
        Value::U32(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::U64(v) => json!(v),
        Value::F32(v) => json!(v),
        Value::String(v) => json!(v),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_json).collect()),
    }
}

/// Decodes every row of `set` into `[{"id": .., "values": {column: value}}]`.
pub fn rows_json(set: &RecordSet, schema: &TableSchema) -> CodecResult<serde_json::Value> {
    let rows = set.rows(schema)?;
    Ok(serde_json::Value::Array(
        rows.iter()
            .map(|row| {
                let values: Map<String, serde_json::Value> = schema
                    .columns
                    .iter()
                    .zip(&row.values)
                    .map(|(column, value)| (column.name.clone(), value_json(value)))
                    .collect();
                json!({ "id": row.id, "values": values })
            })
            .collect(),
    ))
}

/// Outcome of decoding a table and writing it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundTripReport {
    pub original_len: usize,
    pub written_len: usize,
    pub rows: usize,
    /// First byte offset where the files differ.
    pub first_difference: Option<usize>,
    #[serde(skip)]
    pub written: Vec<u8>,
}

impl RoundTripReport {
    pub fn is_identical(&self) -> bool {
        self.first_difference.is_none()
    }
}

/// Decodes `bytes`, re-encodes the rows with the file's own template and
/// compares the output.
pub fn roundtrip(
    bytes: &[u8],
    schema: &TableSchema,
    read: &ReadOptions,
    write: &WriteOptions,
) -> CodecResult<RoundTripReport> {
    let set = read_table(bytes.to_vec(), read)?;
    let rows = set.rows(schema)?;
    let written = write_table(&set.template(), schema, &rows, write)?;
    let first_difference = bytes
        .iter()
        .zip(&written)
        .position(|(a, b)| a != b)
        .or_else(|| (bytes.len() != written.len()).then(|| bytes.len().min(written.len())));
    Ok(RoundTripReport {
        original_len: bytes.len(),
        written_len: written.len(),
        rows: rows.len(),
        first_difference,
        written,
    })
}
