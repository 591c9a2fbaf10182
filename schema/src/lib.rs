//! Column descriptors and table schemas for the wdc table codec.
//!
//! A schema is an ordered list of [`ColumnDescriptor`]s. The codec resolves it
//! once per table into a slot plan and walks columns by position; names are
//! only for humans and tooling.
//!
//! # Design Principles
//!
//! - **Plain data** - Descriptors are values, not reflected Rust types.
//! - **Validated once** - Key-column and cardinality rules are checked at build time.
//! - **Serializable** - With the `serde` feature, schemas load from JSON.

mod error;
mod field;
mod schema;

pub use error::{SchemaError, SchemaResult};
pub use field::{Arity, ColumnDescriptor, ValueType};
pub use schema::{SchemaBuilder, TableSchema};
