//! Error types for codec operations.

use std::fmt;

use schema::ValueType;
use wire::CompressionKind;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while reading, materializing or writing a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Wire format error.
    Wire(wire::DecodeError),

    /// Wire structure could not be encoded.
    Encode(wire::EncodeError),

    /// Bitstream error.
    Bitstream(bitstream::BitError),

    /// Schema failed validation.
    Schema(schema::SchemaError),

    /// The column's type cannot be stored with its compression kind.
    UnsupportedColumn {
        column: String,
        value_type: ValueType,
        kind: CompressionKind,
        reason: UnsupportedReason,
    },

    /// The schema does not describe the file's physical layout.
    SchemaMismatch { reason: MismatchReason },

    /// A row value does not fit its column.
    InvalidValue {
        column: String,
        row_id: u32,
        reason: ValueReason,
    },

    /// A copy-table entry references a missing or aliased source.
    InvalidCopy {
        new_id: u32,
        source_id: u32,
        reason: CopyReason,
    },

    /// Derived layout disagrees with serialized output.
    RoundTripMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Why a column/compression combination is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    StringCompressed,
    WideDictionary,
    ArrayNotAllowed,
    ScalarPalletArray,
}

/// Details for schema mismatch errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    FieldCount { expected: usize, actual: usize },
    Cardinality { column: String, declared: usize, stored: usize },
    CannotInferCardinality { column: String },
    RelationNotStored { column: String },
    IdFieldPosition { expected: usize, actual: usize },
}

/// Details for invalid value errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueReason {
    TypeMismatch {
        expected: ValueType,
        found: &'static str,
    },
    WrongElementCount {
        expected: usize,
        found: usize,
    },
    DoesNotFit {
        bits: u32,
        value: u64,
    },
    CommonArrayDiffers,
    ColumnCount {
        expected: usize,
        found: usize,
    },
    UnresolvedString {
        offset: i64,
    },
    UnknownCommonType {
        raw: u8,
    },
    DuplicateId,
}

/// Details for invalid copy errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyReason {
    MissingSource,
    SourceIsCopy,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Bitstream(e) => write!(f, "bitstream error: {e}"),
            Self::Schema(e) => write!(f, "schema error: {e}"),
            Self::UnsupportedColumn {
                column,
                value_type,
                kind,
                reason,
            } => {
                write!(
                    f,
                    "column '{column}' ({value_type:?}) cannot use {kind:?} compression: {reason}"
                )
            }
            Self::SchemaMismatch { reason } => write!(f, "schema mismatch: {reason}"),
            Self::InvalidValue {
                column,
                row_id,
                reason,
            } => {
                write!(f, "invalid value for '{column}' in row {row_id}: {reason}")
            }
            Self::InvalidCopy {
                new_id,
                source_id,
                reason,
            } => {
                write!(f, "invalid copy {new_id} <- {source_id}: {reason}")
            }
            Self::RoundTripMismatch {
                what,
                expected,
                actual,
            } => {
                write!(f, "{what} mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StringCompressed => write!(f, "strings must be stored uncompressed"),
            Self::WideDictionary => write!(f, "64-bit values cannot use common or pallet data"),
            Self::ArrayNotAllowed => write!(f, "arrays cannot use this kind"),
            Self::ScalarPalletArray => write!(f, "scalars cannot use pallet arrays"),
        }
    }
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount { expected, actual } => {
                write!(f, "file has {expected} fields, schema maps {actual}")
            }
            Self::Cardinality {
                column,
                declared,
                stored,
            } => {
                write!(
                    f,
                    "'{column}' declares {declared} elements, file stores {stored}"
                )
            }
            Self::CannotInferCardinality { column } => {
                write!(f, "cannot infer element count of '{column}'")
            }
            Self::RelationNotStored { column } => {
                write!(f, "'{column}' is a relation but the file has no relationship map")
            }
            Self::IdFieldPosition { expected, actual } => {
                write!(f, "id stored in field {expected}, schema index maps field {actual}")
            }
        }
    }
}

impl fmt::Display for ValueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "expected {expected:?}, found {found}")
            }
            Self::WrongElementCount { expected, found } => {
                write!(f, "expected {expected} elements, found {found}")
            }
            Self::DoesNotFit { bits, value } => {
                write!(f, "value {value} does not fit in {bits} bits")
            }
            Self::CommonArrayDiffers => {
                write!(f, "common array elements must all be equal")
            }
            Self::ColumnCount { expected, found } => {
                write!(f, "expected {expected} values, found {found}")
            }
            Self::UnresolvedString { offset } => {
                write!(f, "string offset {offset} is outside the string table")
            }
            Self::UnknownCommonType { raw } => write!(f, "unknown common value type {raw}"),
            Self::DuplicateId => write!(f, "id appears in more than one row"),
        }
    }
}

impl fmt::Display for CopyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSource => write!(f, "source record does not exist"),
            Self::SourceIsCopy => write!(f, "source record is itself a copy"),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Wire(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Bitstream(e) => Some(e),
            Self::Schema(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wire::DecodeError> for CodecError {
    fn from(err: wire::DecodeError) -> Self {
        Self::Wire(err)
    }
}

impl From<wire::EncodeError> for CodecError {
    fn from(err: wire::EncodeError) -> Self {
        Self::Encode(err)
    }
}

impl From<bitstream::BitError> for CodecError {
    fn from(err: bitstream::BitError) -> Self {
        Self::Bitstream(err)
    }
}

impl From<schema::SchemaError> for CodecError {
    fn from(err: schema::SchemaError) -> Self {
        Self::Schema(err)
    }
}

/// Errors from opening a table file or stream.
#[derive(Debug)]
pub enum OpenError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The bytes are not a valid table.
    Codec(CodecError),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Codec(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Codec(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for OpenError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<CodecError> for OpenError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl From<wire::DecodeError> for OpenError {
    fn from(err: wire::DecodeError) -> Self {
        Self::Codec(CodecError::Wire(err))
    }
}
