//! Table schemas and validation.

use std::collections::HashSet;

use crate::error::{SchemaError, SchemaResult};
use crate::{Arity, ColumnDescriptor};

/// An ordered list of column descriptors for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    /// Creates a schema from columns after validation.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> SchemaResult<Self> {
        let schema = Self {
            name: name.into(),
            columns,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Creates a schema builder.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Position of the index column, if any.
    #[must_use]
    pub fn index_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.index)
    }

    /// Position of the non-inline relation column, if any.
    #[must_use]
    pub fn relation_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.non_inline_relation)
    }

    /// Validates schema invariants.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut names = HashSet::new();
        let mut index: Option<&str> = None;
        let mut relation: Option<&str> = None;

        for (position, column) in self.columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(SchemaError::EmptyColumnName { position });
            }
            if !names.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
            if column.arity == Arity::Array(0) {
                return Err(SchemaError::ZeroCardinality {
                    name: column.name.clone(),
                });
            }
            if column.index || column.non_inline_relation {
                validate_key(column)?;
            }
            if column.index {
                if let Some(first) = index {
                    return Err(SchemaError::MultipleIndexColumns {
                        first: first.to_string(),
                        second: column.name.clone(),
                    });
                }
                index = Some(&column.name);
            }
            if column.non_inline_relation {
                if let Some(first) = relation {
                    return Err(SchemaError::MultipleRelationColumns {
                        first: first.to_string(),
                        second: column.name.clone(),
                    });
                }
                relation = Some(&column.name);
            }
        }
        Ok(())
    }
}

/// Builder for `TableSchema`.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    name: String,
    columns: Vec<ColumnDescriptor>,
}

impl SchemaBuilder {
    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Builds the schema after validation.
    pub fn build(self) -> SchemaResult<TableSchema> {
        TableSchema::new(self.name, self.columns)
    }
}

fn validate_key(column: &ColumnDescriptor) -> SchemaResult<()> {
    if column.arity.is_array() || !column.value_type.is_int32() {
        return Err(SchemaError::InvalidKeyColumn {
            name: column.name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueType;

    #[test]
    fn schema_builder_roundtrip() {
        let schema = TableSchema::builder("Spell")
            .column(ColumnDescriptor::scalar("ID", ValueType::U32).index())
            .column(ColumnDescriptor::scalar("Name", ValueType::String))
            .column(ColumnDescriptor::array("Effects", ValueType::I32, 3))
            .build()
            .unwrap();
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.index_column(), Some(0));
        assert_eq!(schema.relation_column(), None);
    }

    #[test]
    fn schema_rejects_duplicate_columns() {
        let err = TableSchema::new(
            "T",
            vec![
                ColumnDescriptor::scalar("A", ValueType::U8),
                ColumnDescriptor::scalar("A", ValueType::U16),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { .. }));
    }

    #[test]
    fn schema_rejects_two_index_columns() {
        let err = TableSchema::new(
            "T",
            vec![
                ColumnDescriptor::scalar("A", ValueType::U32).index(),
                ColumnDescriptor::scalar("B", ValueType::U32).index(),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MultipleIndexColumns { .. }));
    }

    #[test]
    fn schema_rejects_wide_index() {
        let err = TableSchema::new(
            "T",
            vec![ColumnDescriptor::scalar("A", ValueType::U64).index()],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidKeyColumn { .. }));
    }

    #[test]
    fn schema_rejects_array_relation() {
        let err = TableSchema::new(
            "T",
            vec![ColumnDescriptor::array("Parent", ValueType::U32, 2).relation()],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidKeyColumn { .. }));
    }

    #[test]
    fn schema_rejects_zero_cardinality() {
        let err = TableSchema::new(
            "T",
            vec![ColumnDescriptor::array("A", ValueType::U8, 0)],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::ZeroCardinality { .. }));
    }

    #[test]
    fn schema_rejects_empty_name() {
        let err = TableSchema::new("T", vec![ColumnDescriptor::scalar("", ValueType::U8)])
            .unwrap_err();
        assert_eq!(err, SchemaError::EmptyColumnName { position: 0 });
    }
}
