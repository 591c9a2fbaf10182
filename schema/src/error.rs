//! Schema validation errors.

use std::fmt;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building or validating a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A column has an empty name.
    EmptyColumnName { position: usize },

    /// Two columns share a name.
    DuplicateColumn { name: String },

    /// More than one column is marked as the index.
    MultipleIndexColumns { first: String, second: String },

    /// More than one column is marked as a non-inline relation.
    MultipleRelationColumns { first: String, second: String },

    /// The index or relation column is not a scalar 32-bit integer.
    InvalidKeyColumn { name: String },

    /// An array column declares zero elements.
    ZeroCardinality { name: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyColumnName { position } => {
                write!(f, "column {position} has an empty name")
            }
            Self::DuplicateColumn { name } => write!(f, "duplicate column '{name}'"),
            Self::MultipleIndexColumns { first, second } => {
                write!(f, "index column declared twice: '{first}' and '{second}'")
            }
            Self::MultipleRelationColumns { first, second } => {
                write!(
                    f,
                    "relation column declared twice: '{first}' and '{second}'"
                )
            }
            Self::InvalidKeyColumn { name } => {
                write!(f, "key column '{name}' must be a scalar 32-bit integer")
            }
            Self::ZeroCardinality { name } => {
                write!(f, "array column '{name}' declares zero elements")
            }
        }
    }
}

impl std::error::Error for SchemaError {}
