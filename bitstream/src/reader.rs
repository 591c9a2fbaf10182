//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};

/// A bit-level reader over little-endian, LSB-first packed data.
///
/// Bit `n` of the stream is bit `n % 8` of byte `n / 8`, so a value packed at
/// an arbitrary bit offset is the little-endian load of the covering bytes
/// shifted right by the offset within the first byte.
///
/// All read operations are bounds-checked; reading past the end of the
/// buffer is an error rather than a read of implicit padding.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Creates a reader positioned at `byte_offset`.
    pub fn at_byte(data: &'a [u8], byte_offset: usize) -> BitResult<Self> {
        let mut reader = Self::new(data);
        reader.seek_bits(byte_offset.saturating_mul(8))?;
        Ok(reader)
    }

    /// Returns the underlying buffer.
    #[must_use]
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Returns the byte containing the current bit position.
    #[must_use]
    pub const fn byte_position(&self) -> usize {
        self.bit_pos / 8
    }

    /// Returns `true` if the cursor sits on a byte boundary.
    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        self.bit_pos % 8 == 0
    }

    /// Moves the cursor to an absolute bit position.
    pub fn seek_bits(&mut self, bit_pos: usize) -> BitResult<()> {
        let total = self.data.len().saturating_mul(8);
        if bit_pos > total {
            return Err(BitError::UnexpectedEof {
                requested: bit_pos,
                available: total,
            });
        }
        self.bit_pos = bit_pos;
        Ok(())
    }

    /// Advances the cursor without reading.
    pub fn skip_bits(&mut self, bits: usize) -> BitResult<()> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    /// Reads a single bit as a boolean.
    pub fn read_bit(&mut self) -> BitResult<bool> {
        self.ensure_bits(1)?;
        let bit = (self.data[self.bit_pos / 8] >> (self.bit_pos % 8)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 64 bits as an unsigned integer.
    pub fn read_bits(&mut self, bits: u32) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits as usize)?;

        let value = if self.is_aligned() && bits % 8 == 0 {
            self.load_aligned(bits as usize / 8)
        } else {
            self.load_shifted(bits)
        };
        self.bit_pos += bits as usize;
        Ok(value)
    }

    /// Reads up to 64 bits and sign-extends from bit `bits - 1`.
    pub fn read_bits_signed(&mut self, bits: u32) -> BitResult<i64> {
        let raw = self.read_bits(bits)?;
        if bits == 0 || bits == 64 {
            return Ok(raw as i64);
        }
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Aligns to the next byte boundary.
    pub fn align_to_byte(&mut self) -> BitResult<()> {
        let rem = self.bit_pos % 8;
        if rem == 0 {
            return Ok(());
        }
        self.skip_bits(8 - rem)
    }

    /// Reads a byte-aligned `u8`.
    pub fn read_u8_aligned(&mut self) -> BitResult<u8> {
        let bytes = self.read_aligned_bytes::<1>()?;
        Ok(bytes[0])
    }

    /// Reads a byte-aligned `u16` (little-endian).
    pub fn read_u16_aligned(&mut self) -> BitResult<u16> {
        let bytes = self.read_aligned_bytes::<2>()?;
        Ok(u16::from_le_bytes(bytes))
    }

    /// Reads a byte-aligned `i16` (little-endian).
    pub fn read_i16_aligned(&mut self) -> BitResult<i16> {
        let bytes = self.read_aligned_bytes::<2>()?;
        Ok(i16::from_le_bytes(bytes))
    }

    /// Reads a byte-aligned `u32` (little-endian).
    pub fn read_u32_aligned(&mut self) -> BitResult<u32> {
        let bytes = self.read_aligned_bytes::<4>()?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads a byte-aligned `u64` (little-endian).
    pub fn read_u64_aligned(&mut self) -> BitResult<u64> {
        let bytes = self.read_aligned_bytes::<8>()?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Reads `len` byte-aligned bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> BitResult<&'a [u8]> {
        self.ensure_aligned()?;
        self.ensure_bits(len.saturating_mul(8))?;
        let idx = self.bit_pos / 8;
        self.bit_pos += len * 8;
        Ok(&self.data[idx..idx + len])
    }

    /// Reads a null-terminated byte string, consuming the terminator.
    ///
    /// The returned slice excludes the terminator.
    pub fn read_cstring(&mut self) -> BitResult<&'a [u8]> {
        self.ensure_aligned()?;
        let start = self.bit_pos / 8;
        let rest = self.data.get(start..).unwrap_or_default();
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(BitError::UnterminatedString { start })?;
        self.bit_pos += (len + 1) * 8;
        Ok(&rest[..len])
    }

    fn ensure_aligned(&self) -> BitResult<()> {
        if !self.is_aligned() {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bit_pos,
            });
        }
        Ok(())
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::UnexpectedEof {
                requested: bits,
                available,
            });
        }
        Ok(())
    }

    fn read_aligned_bytes<const N: usize>(&mut self) -> BitResult<[u8; N]> {
        self.ensure_aligned()?;
        self.ensure_bits(N * 8)?;
        let idx = self.bit_pos / 8;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[idx..idx + N]);
        self.bit_pos += N * 8;
        Ok(out)
    }

    fn load_aligned(&self, bytes: usize) -> u64 {
        let start = self.bit_pos / 8;
        let mut buf = [0u8; 8];
        buf[..bytes].copy_from_slice(&self.data[start..start + bytes]);
        u64::from_le_bytes(buf)
    }

    // At most 9 bytes cover 64 bits starting at a non-zero bit offset.
    fn load_shifted(&self, bits: u32) -> u64 {
        let start = self.bit_pos / 8;
        let shift = self.bit_pos % 8;
        let span = (shift + bits as usize + 7) / 8;
        let mut buf = [0u8; 16];
        buf[..span].copy_from_slice(&self.data[start..start + span]);
        let wide = u128::from_le_bytes(buf) >> shift;
        let mask = (1u128 << bits) - 1;
        (wide & mask) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reader() {
        let reader = BitReader::new(&[]);
        assert!(reader.is_empty());
        assert_eq!(reader.bits_remaining(), 0);
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn read_from_empty_fails() {
        let mut reader = BitReader::new(&[]);
        let result = reader.read_bit();
        assert!(matches!(result, Err(BitError::UnexpectedEof { .. })));
    }

    #[test]
    fn read_bits_lsb_first() {
        let mut reader = BitReader::new(&[0b1010_0110]);
        assert_eq!(reader.read_bits(3).unwrap(), 0b110);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10100);
    }

    #[test]
    fn read_bits_across_bytes() {
        let mut reader = BitReader::new(&[0b1111_0000, 0b0000_1111]);
        reader.read_bits(4).unwrap();
        assert_eq!(reader.read_bits(8).unwrap(), 0b1111_1111);
        assert_eq!(reader.bits_remaining(), 4);
    }

    #[test]
    fn read_64_bits_unaligned() {
        let mut data = [0xFFu8; 9];
        data[0] = 0x01;
        data[8] = 0x00;
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(64).unwrap(), ((1u64 << 56) - 1) << 7);
    }

    #[test]
    fn read_signed_sign_extends() {
        let mut reader = BitReader::new(&[0b0000_0111]);
        assert_eq!(reader.read_bits_signed(3).unwrap(), -1);
        let mut reader = BitReader::new(&[0b0000_0011]);
        assert_eq!(reader.read_bits_signed(3).unwrap(), 3);
    }

    #[test]
    fn read_aligned_u32() {
        let mut reader = BitReader::new(&[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_u32_aligned().unwrap(), 0x1234_5678);
    }

    #[test]
    fn aligned_fast_path_matches_aligned_helpers() {
        let data = [0x78, 0x56, 0x34, 0x12];
        let mut fast = BitReader::new(&data);
        let mut helper = BitReader::new(&data);
        assert_eq!(
            fast.read_bits(32).unwrap(),
            u64::from(helper.read_u32_aligned().unwrap())
        );
    }

    #[test]
    fn read_misaligned_fails() {
        let mut reader = BitReader::new(&[0xFF, 0xFF]);
        reader.read_bits(1).unwrap();
        let err = reader.read_u8_aligned().unwrap_err();
        assert!(matches!(err, BitError::MisalignedAccess { .. }));
    }

    #[test]
    fn over_read_is_an_error() {
        let mut reader = BitReader::new(&[0xFF, 0xFF]);
        reader.read_bits(9).unwrap();
        let err = reader.read_bits(8).unwrap_err();
        assert_eq!(
            err,
            BitError::UnexpectedEof {
                requested: 8,
                available: 7
            }
        );
    }

    #[test]
    fn read_cstring_consumes_terminator() {
        let mut reader = BitReader::new(b"abc\0de\0");
        assert_eq!(reader.read_cstring().unwrap(), b"abc");
        assert_eq!(reader.read_cstring().unwrap(), b"de");
        assert!(reader.is_empty());
    }

    #[test]
    fn read_cstring_unterminated() {
        let mut reader = BitReader::new(b"abc");
        let err = reader.read_cstring().unwrap_err();
        assert_eq!(err, BitError::UnterminatedString { start: 0 });
    }

    #[test]
    fn at_byte_positions_cursor() {
        let reader = BitReader::at_byte(&[1, 2, 3], 2).unwrap();
        assert_eq!(reader.bit_position(), 16);
        assert!(BitReader::at_byte(&[1, 2, 3], 4).is_err());
    }

    #[test]
    fn read_bits_invalid_count() {
        let mut reader = BitReader::new(&[0; 16]);
        assert!(matches!(
            reader.read_bits(65),
            Err(BitError::InvalidBitCount { bits: 65, .. })
        ));
    }
}
