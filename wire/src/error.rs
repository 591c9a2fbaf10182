//! Error types for wire format operations.

use std::fmt;

use bitstream::BitError;

/// Result type for wire format operations.
pub type WireResult<T> = Result<T, DecodeError>;

/// Decode errors for table headers and metadata regions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Buffer is too small to contain the required header.
    TooSmall { actual: usize, required: usize },

    /// The leading 4-byte tag names no known generation.
    InvalidMagic { found: [u8; 4] },

    /// A column declares a compression kind outside the known set.
    UnknownCompression { column: usize, kind: u32 },

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// A region extends past the end of the buffer.
    Truncated {
        region: Region,
        needed: usize,
        available: usize,
    },

    /// Declared sizes are inconsistent with each other.
    InvalidLayout { region: Region, reason: &'static str },

    /// Low-level read failure.
    Bitstream(BitError),
}

/// Specific decode limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    SectionCount,
    FieldCount,
    RecordCount,
}

/// Named regions of a table file, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Header,
    SectionHeaders,
    FieldMeta,
    ColumnMeta,
    PalletData,
    CommonData,
    Records,
    StringTable,
    OffsetMap,
    SecondaryKeys,
    IdList,
    CopyTable,
    RelationshipMap,
    IdIndex,
}

/// Errors that can occur during encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A derived value does not fit its on-disk field.
    ValueOverflow { field: &'static str, value: u64 },

    /// Low-level write failure.
    Bitstream(BitError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall { actual, required } => {
                write!(
                    f,
                    "buffer too small: {actual} bytes, need at least {required}"
                )
            }
            Self::InvalidMagic { found } => {
                write!(f, "invalid magic tag: {}", tag_display(*found))
            }
            Self::UnknownCompression { column, kind } => {
                write!(f, "column {column} has unknown compression kind {kind}")
            }
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::Truncated {
                region,
                needed,
                available,
            } => {
                write!(
                    f,
                    "truncated {region}: need {needed} bytes, have {available}"
                )
            }
            Self::InvalidLayout { region, reason } => {
                write!(f, "invalid {region}: {reason}")
            }
            Self::Bitstream(err) => write!(f, "bitstream error: {err}"),
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SectionCount => "section count",
            Self::FieldCount => "field count",
            Self::RecordCount => "record count",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::SectionHeaders => "section headers",
            Self::FieldMeta => "field metadata",
            Self::ColumnMeta => "column metadata",
            Self::PalletData => "pallet data",
            Self::CommonData => "common data",
            Self::Records => "record data",
            Self::StringTable => "string table",
            Self::OffsetMap => "offset map",
            Self::SecondaryKeys => "secondary keys",
            Self::IdList => "id list",
            Self::CopyTable => "copy table",
            Self::RelationshipMap => "relationship map",
            Self::IdIndex => "id index",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueOverflow { field, value } => {
                write!(f, "value {value} does not fit {field}")
            }
            Self::Bitstream(err) => write!(f, "bitstream error: {err}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bitstream(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bitstream(err) => Some(err),
            Self::ValueOverflow { .. } => None,
        }
    }
}

impl From<BitError> for DecodeError {
    fn from(err: BitError) -> Self {
        Self::Bitstream(err)
    }
}

impl From<BitError> for EncodeError {
    fn from(err: BitError) -> Self {
        Self::Bitstream(err)
    }
}

fn tag_display(tag: [u8; 4]) -> String {
    if tag.iter().all(u8::is_ascii_graphic) {
        tag.iter().map(|&b| char::from(b)).collect()
    } else {
        format!("0x{:08X}", u32::from_be_bytes(tag))
    }
}

/// Returns `buf[offset..offset + len]` or a [`DecodeError::Truncated`] naming `region`.
pub fn region_slice(buf: &[u8], offset: usize, len: usize, region: Region) -> WireResult<&[u8]> {
    let end = offset.checked_add(len).ok_or(DecodeError::Truncated {
        region,
        needed: usize::MAX,
        available: buf.len(),
    })?;
    buf.get(offset..end).ok_or(DecodeError::Truncated {
        region,
        needed: end,
        available: buf.len(),
    })
}
