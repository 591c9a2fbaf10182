//! Readers and writers for versioned bit-packed table files.
//!
//! This crate ties together bitstream, wire and schema: it locates records
//! in WDBC, WDB2, WDB5, WDB6, WDC1, WDC2 and WDC3 files, materializes them
//! as typed rows against a caller-supplied schema, and writes rows back in
//! the generation and layout of a template.
//!
//! # Features
//!
//! - Every column compression kind: plain, bitpacked, signed bitpacked,
//!   common, pallet and pallet array
//! - Sparse records, id lists, copy tables and relationship maps
//! - Multi-section tables, with encrypted sections skipped and reported
//! - Parallel row materialization for large tables
//! - Hotfix application over materialized rows
//!
//! # Design Principles
//!
//! - **Checked** - Every region and record is bounds-checked against the file.
//! - **Layout-driven** - The schema is resolved once into per-field plans.
//! - **Deterministic** - Same rows and template produce the same bytes.

mod column;
mod derive;
mod error;
mod hotfix;
mod io;
mod layout;
mod options;
mod read;
mod record;
mod strings;
mod value;
mod write;

pub use error::{
    CodecError, CodecResult, CopyReason, MismatchReason, OpenError, UnsupportedReason, ValueReason,
};
pub use hotfix::{apply_hotfixes, DeletionPolicy, HotfixEntry, HotfixReport};
pub use io::{open_table, read_table_from};
pub use options::{ReadOptions, TimestampPolicy, WriteOptions};
pub use read::read_table;
pub use record::{EncryptedSection, RawRecord, RecordSet, SectionInfo, TableMeta};
pub use strings::{StringBlock, StringTableBuilder};
pub use value::{Row, Value};
pub use wire::Limits as WireLimits;
pub use write::{
    write_table, PreservedSection, RecordMeta, SectionTemplate, TableTemplate, TemplateBuilder,
};
