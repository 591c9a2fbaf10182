//! Error types for bitstream operations.

use std::fmt;

/// Result alias used by the reader and writer.
pub type BitResult<T> = Result<T, BitError>;

/// Failures of the bit cursor. Every read and write is bounds-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitError {
    /// A read needed more bits than the buffer holds.
    UnexpectedEof {
        /// Bits the read needed.
        requested: usize,
        /// Bits left after the cursor.
        available: usize,
    },

    /// Bit count outside `0..=max_bits`.
    InvalidBitCount {
        bits: u32,
        max_bits: u32,
    },

    /// The value does not fit the field width.
    ValueOutOfRange {
        value: u64,
        bits: u32,
    },

    /// Byte-aligned access attempted at a non-aligned position.
    MisalignedAccess {
        /// Current bit position.
        bit_position: usize,
    },

    /// A null-terminated string ran to the end of the buffer.
    UnterminatedString {
        /// Byte position where the string started.
        start: usize,
    },

    /// Patch target lies outside the already written region.
    PatchOutOfRange {
        /// First bit of the patch.
        bit_offset: usize,
        /// Width of the patch in bits.
        bits: u32,
        /// Bits written so far.
        written: usize,
    },
}

impl fmt::Display for BitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof {
                requested,
                available,
            } => {
                write!(
                    f,
                    "unexpected end of buffer: needed {requested} bits, {available} left"
                )
            }
            Self::InvalidBitCount { bits, max_bits } => {
                write!(f, "bit count {bits} out of range (max {max_bits})")
            }
            Self::ValueOutOfRange { value, bits } => {
                write!(f, "value {value} does not fit in {bits} bits")
            }
            Self::MisalignedAccess { bit_position } => {
                write!(f, "byte-aligned access at bit position {bit_position}")
            }
            Self::UnterminatedString { start } => {
                write!(f, "string starting at byte {start} has no terminator")
            }
            Self::PatchOutOfRange {
                bit_offset,
                bits,
                written,
            } => {
                write!(
                    f,
                    "patch of {bits} bits at bit {bit_offset} exceeds {written} written bits"
                )
            }
        }
    }
}

impl std::error::Error for BitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_names_both_counts() {
        let msg = BitError::UnexpectedEof {
            requested: 17,
            available: 5,
        }
        .to_string();
        assert!(msg.contains("17 bits"));
        assert!(msg.contains("5 left"));
    }

    #[test]
    fn width_errors_name_the_width() {
        let count = BitError::InvalidBitCount {
            bits: 65,
            max_bits: 64,
        };
        assert_eq!(count.to_string(), "bit count 65 out of range (max 64)");
        let range = BitError::ValueOutOfRange { value: 9, bits: 3 };
        assert_eq!(range.to_string(), "value 9 does not fit in 3 bits");
    }

    #[test]
    fn patch_and_string_positions() {
        let patch = BitError::PatchOutOfRange {
            bit_offset: 40,
            bits: 32,
            written: 48,
        };
        assert!(patch.to_string().contains("bit 40"));
        assert!(BitError::UnterminatedString { start: 12 }
            .to_string()
            .contains("byte 12"));
    }

    #[test]
    fn usable_as_boxed_error() {
        let err: Box<dyn std::error::Error> =
            Box::new(BitError::MisalignedAccess { bit_position: 3 });
        assert!(err.to_string().contains('3'));
    }
}
