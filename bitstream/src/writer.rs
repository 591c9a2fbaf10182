//! Bit-level writer for encoding packed binary data.

use crate::error::{BitError, BitResult};

/// A bit-level writer producing little-endian, LSB-first packed data.
///
/// The writer owns a growable buffer. Bits past [`bits_written`](Self::bits_written)
/// inside the last byte are always zero, so a partially filled byte can be
/// continued by a later write or patched with [`write_at`](Self::write_at).
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            bit_len: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.bit_len
    }

    /// Returns the number of bytes touched so far (partial last byte included).
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the write position sits on a byte boundary.
    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        self.bit_len % 8 == 0
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, value: bool) {
        if self.is_aligned() {
            self.bytes.push(0);
        }
        if value {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 1 << (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    /// Writes up to 64 bits from an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 64`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write_bits(&mut self, value: u64, bits: u32) -> BitResult<()> {
        check_range(value, bits)?;
        if bits == 0 {
            return Ok(());
        }
        if self.is_aligned() && bits % 8 == 0 {
            self.bytes
                .extend_from_slice(&value.to_le_bytes()[..bits as usize / 8]);
        } else {
            let end = (self.bit_len + bits as usize).div_ceil(8);
            if self.bytes.len() < end {
                self.bytes.resize(end, 0);
            }
            self.or_bits(self.bit_len, value, bits);
        }
        self.bit_len += bits as usize;
        Ok(())
    }

    /// Writes the low `bits` bits of a two's-complement value.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in a
    /// signed field of `bits` bits.
    pub fn write_bits_signed(&mut self, value: i64, bits: u32) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(());
        }
        if bits < 64 {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if value < min || value > max {
                return Err(BitError::ValueOutOfRange {
                    value: value as u64,
                    bits,
                });
            }
        }
        self.write_bits(value as u64 & mask(bits), bits)
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        self.bit_len = self.bit_len.div_ceil(8) * 8;
    }

    /// Writes a byte-aligned `u8`.
    pub fn write_u8_aligned(&mut self, value: u8) -> BitResult<()> {
        self.write_bytes(&[value])
    }

    /// Writes a byte-aligned `u16` (little-endian).
    pub fn write_u16_aligned(&mut self, value: u16) -> BitResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `i16` (little-endian).
    pub fn write_i16_aligned(&mut self, value: i16) -> BitResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `u32` (little-endian).
    pub fn write_u32_aligned(&mut self, value: u32) -> BitResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `u64` (little-endian).
    pub fn write_u64_aligned(&mut self, value: u64) -> BitResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes raw bytes at a byte-aligned position.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.ensure_aligned()?;
        self.bytes.extend_from_slice(bytes);
        self.bit_len += bytes.len() * 8;
        Ok(())
    }

    /// Writes bytes followed by a null terminator.
    pub fn write_cstring(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.write_bytes(bytes)?;
        self.write_bytes(&[0])
    }

    /// Overwrites `bits` bits at `bit_offset` inside the already written region.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::PatchOutOfRange`] if the patch extends past
    /// [`bits_written`](Self::bits_written).
    pub fn write_at(&mut self, value: u64, bits: u32, bit_offset: usize) -> BitResult<()> {
        check_range(value, bits)?;
        if bit_offset + bits as usize > self.bit_len {
            return Err(BitError::PatchOutOfRange {
                bit_offset,
                bits,
                written: self.bit_len,
            });
        }
        if bits == 0 {
            return Ok(());
        }
        self.clear_bits(bit_offset, bits);
        self.or_bits(bit_offset, value, bits);
        Ok(())
    }

    /// Pads with zero bytes until the byte length is a multiple of `multiple`.
    ///
    /// Any partial byte is completed first. A `multiple` of 0 or 1 only aligns.
    pub fn resize_to_multiple(&mut self, multiple: usize) {
        self.align_to_byte();
        let len = self.bit_len / 8;
        let target = if multiple > 1 {
            len.div_ceil(multiple) * multiple
        } else {
            len
        };
        self.bytes.resize(target, 0);
        self.bit_len = target * 8;
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// If the last byte is incomplete, its high bits are zero.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.resize(self.bit_len.div_ceil(8), 0);
        self.bytes
    }

    /// Finishes writing and appends to the provided buffer.
    pub fn finish_into(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.finish());
    }

    const fn ensure_aligned(&self) -> BitResult<()> {
        if !self.is_aligned() {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bit_len,
            });
        }
        Ok(())
    }

    fn or_bits(&mut self, bit_offset: usize, value: u64, bits: u32) {
        let start = bit_offset / 8;
        let shift = bit_offset % 8;
        let span = (shift + bits as usize).div_ceil(8);
        let wide = (u128::from(value & mask(bits)) << shift).to_le_bytes();
        for (dst, src) in self.bytes[start..start + span].iter_mut().zip(wide) {
            *dst |= src;
        }
    }

    fn clear_bits(&mut self, bit_offset: usize, bits: u32) {
        let start = bit_offset / 8;
        let shift = bit_offset % 8;
        let span = (shift + bits as usize).div_ceil(8);
        let wide = (u128::from(mask(bits)) << shift).to_le_bytes();
        for (dst, src) in self.bytes[start..start + span].iter_mut().zip(wide) {
            *dst &= !src;
        }
    }
}

const fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn check_range(value: u64, bits: u32) -> BitResult<()> {
    if bits > 64 {
        return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
    }
    if bits < 64 && value > mask(bits) {
        return Err(BitError::ValueOutOfRange { value, bits });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer() {
        let writer = BitWriter::new();
        assert_eq!(writer.bits_written(), 0);
        let bytes = writer.finish();
        assert!(bytes.is_empty());
    }

    #[test]
    fn write_single_bit_true() {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        assert_eq!(writer.bits_written(), 1);
        assert_eq!(writer.finish(), vec![0b0000_0001]);
    }

    #[test]
    fn write_bits_lsb_first() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b110, 3).unwrap();
        writer.write_bits(0b10100, 5).unwrap();
        assert_eq!(writer.finish(), vec![0b1010_0110]);
    }

    #[test]
    fn write_bits_across_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bits(0, 4).unwrap();
        writer.write_bits(0xFF, 8).unwrap();
        assert_eq!(writer.finish(), vec![0b1111_0000, 0b0000_1111]);
    }

    #[test]
    fn write_bits_value_out_of_range() {
        let mut writer = BitWriter::new();
        let err = writer.write_bits(8, 3).unwrap_err();
        assert_eq!(err, BitError::ValueOutOfRange { value: 8, bits: 3 });
    }

    #[test]
    fn write_bits_invalid_count() {
        let mut writer = BitWriter::new();
        assert!(matches!(
            writer.write_bits(0, 65),
            Err(BitError::InvalidBitCount { bits: 65, .. })
        ));
    }

    #[test]
    fn write_signed_masks_to_width() {
        let mut writer = BitWriter::new();
        writer.write_bits_signed(-1, 3).unwrap();
        writer.write_bits_signed(3, 5).unwrap();
        assert_eq!(writer.finish(), vec![0b0001_1111]);
    }

    #[test]
    fn write_signed_out_of_range() {
        let mut writer = BitWriter::new();
        assert!(writer.write_bits_signed(4, 3).is_err());
        assert!(writer.write_bits_signed(-5, 3).is_err());
    }

    #[test]
    fn write_aligned_u32() {
        let mut writer = BitWriter::new();
        writer.write_u32_aligned(0x1234_5678).unwrap();
        assert_eq!(writer.finish(), vec![0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn write_aligned_after_bits_fails() {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        let err = writer.write_u8_aligned(1).unwrap_err();
        assert_eq!(err, BitError::MisalignedAccess { bit_position: 1 });
    }

    #[test]
    fn align_then_aligned_write() {
        let mut writer = BitWriter::new();
        writer.write_bits(1, 3).unwrap();
        writer.align_to_byte();
        writer.write_u8_aligned(0xAB).unwrap();
        assert_eq!(writer.finish(), vec![0x01, 0xAB]);
    }

    #[test]
    fn write_cstring_appends_terminator() {
        let mut writer = BitWriter::new();
        writer.write_cstring(b"hi").unwrap();
        assert_eq!(writer.finish(), b"hi\0".to_vec());
    }

    #[test]
    fn write_at_patches_in_place() {
        let mut writer = BitWriter::new();
        writer.write_bits(0x3F, 6).unwrap();
        writer.write_bits(0xFFFF, 16).unwrap();
        writer.write_at(0x1234, 16, 6).unwrap();
        assert_eq!(writer.bits_written(), 22);

        let bytes = writer.finish();
        let mut reader = crate::BitReader::new(&bytes);
        assert_eq!(reader.read_bits(6).unwrap(), 0x3F);
        assert_eq!(reader.read_bits(16).unwrap(), 0x1234);
    }

    #[test]
    fn write_at_out_of_range() {
        let mut writer = BitWriter::new();
        writer.write_u32_aligned(0).unwrap();
        let err = writer.write_at(1, 8, 30).unwrap_err();
        assert!(matches!(err, BitError::PatchOutOfRange { .. }));
    }

    #[test]
    fn resize_to_multiple_pads() {
        let mut writer = BitWriter::new();
        writer.write_bits(1, 3).unwrap();
        writer.resize_to_multiple(4);
        assert_eq!(writer.bits_written(), 32);
        assert_eq!(writer.finish(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn resize_to_multiple_noop_when_aligned() {
        let mut writer = BitWriter::new();
        writer.write_u32_aligned(7).unwrap();
        writer.resize_to_multiple(4);
        assert_eq!(writer.byte_len(), 4);
    }

    #[test]
    fn finish_into_appends() {
        let mut writer = BitWriter::new();
        writer.write_u8_aligned(0xCD).unwrap();
        let mut buf = vec![0xAB];
        writer.finish_into(&mut buf);
        assert_eq!(buf, vec![0xAB, 0xCD]);
    }
}
