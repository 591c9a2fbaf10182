//! Low-level bit packing primitives for the wdc table codec.
//!
//! This crate provides [`BitWriter`] and [`BitReader`] for LSB-first bit-level
//! encoding and decoding over little-endian bytes, plus the [`Value32`] and
//! [`Value64`] bit-pattern boxes used for dictionary and default values.
//!
//! Bits are numbered from the least significant bit of each byte, so a
//! field that straddles a byte boundary takes its low bits from the earlier
//! byte. Reading past the end of a buffer is [`BitError::UnexpectedEof`];
//! nothing pads the input.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter, Value32};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bits(5, 3)?;
//! writer.write_bits(0x1F, 6)?;
//! writer.write_bits_signed(-2, 4)?;
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_bits(3)?, 5);
//! assert_eq!(reader.read_bits(6)?, 0x1F);
//! assert_eq!(reader.read_bits_signed(4)?, -2);
//! assert_eq!(Value32::from_f32(1.0).as_u32(), 0x3F80_0000);
//! # Ok::<(), bitstream::BitError>(())
//! ```

mod error;
mod reader;
mod value;
mod writer;

pub use error::{BitError, BitResult};
pub use reader::BitReader;
pub use value::{Value32, Value64};
pub use writer::BitWriter;
