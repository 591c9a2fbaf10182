use bitstream::{BitReader, BitWriter, Value32};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Bit(bool),
    Bits { bits: u32, value: u64 },
    Signed { bits: u32, value: i64 },
    Align,
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    CString(Vec<u8>),
}

fn mask_value(bits: u32, value: u64) -> u64 {
    if bits >= 64 {
        value
    } else {
        let mask = (1u64 << bits) - 1;
        value & mask
    }
}

fn clamp_signed(bits: u32, value: i64) -> i64 {
    if bits >= 64 {
        value
    } else {
        let shift = 64 - bits;
        (value << shift) >> shift
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(Op::Bit),
        (1u32..=64, any::<u64>()).prop_map(|(bits, value)| Op::Bits {
            bits,
            value: mask_value(bits, value),
        }),
        (1u32..=64, any::<i64>()).prop_map(|(bits, value)| Op::Signed {
            bits,
            value: clamp_signed(bits, value),
        }),
        Just(Op::Align),
        any::<u8>().prop_map(Op::U8),
        any::<u16>().prop_map(Op::U16),
        any::<u32>().prop_map(Op::U32),
        any::<u64>().prop_map(Op::U64),
        prop::collection::vec(1u8..=255, 0..8).prop_map(Op::CString),
    ]
}

proptest! {
    #[test]
    fn prop_roundtrip_ops(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut writer = BitWriter::new();

        for op in &ops {
            match op {
                Op::Bit(b) => writer.write_bit(*b),
                Op::Bits { bits, value } => writer.write_bits(*value, *bits).unwrap(),
                Op::Signed { bits, value } => writer.write_bits_signed(*value, *bits).unwrap(),
                Op::Align => writer.align_to_byte(),
                Op::U8(v) => {
                    writer.align_to_byte();
                    writer.write_u8_aligned(*v).unwrap();
                }
                Op::U16(v) => {
                    writer.align_to_byte();
                    writer.write_u16_aligned(*v).unwrap();
                }
                Op::U32(v) => {
                    writer.align_to_byte();
                    writer.write_u32_aligned(*v).unwrap();
                }
                Op::U64(v) => {
                    writer.align_to_byte();
                    writer.write_u64_aligned(*v).unwrap();
                }
                Op::CString(s) => {
                    writer.align_to_byte();
                    writer.write_cstring(s).unwrap();
                }
            }
        }

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        for op in &ops {
            match op {
                Op::Bit(b) => prop_assert_eq!(reader.read_bit().unwrap(), *b),
                Op::Bits { bits, value } => {
                    prop_assert_eq!(reader.read_bits(*bits).unwrap(), *value);
                }
                Op::Signed { bits, value } => {
                    prop_assert_eq!(reader.read_bits_signed(*bits).unwrap(), *value);
                }
                Op::Align => reader.align_to_byte().unwrap(),
                Op::U8(v) => {
                    reader.align_to_byte().unwrap();
                    prop_assert_eq!(reader.read_u8_aligned().unwrap(), *v);
                }
                Op::U16(v) => {
                    reader.align_to_byte().unwrap();
                    prop_assert_eq!(reader.read_u16_aligned().unwrap(), *v);
                }
                Op::U32(v) => {
                    reader.align_to_byte().unwrap();
                    prop_assert_eq!(reader.read_u32_aligned().unwrap(), *v);
                }
                Op::U64(v) => {
                    reader.align_to_byte().unwrap();
                    prop_assert_eq!(reader.read_u64_aligned().unwrap(), *v);
                }
                Op::CString(s) => {
                    reader.align_to_byte().unwrap();
                    prop_assert_eq!(reader.read_cstring().unwrap(), s.as_slice());
                }
            }
        }
    }

    #[test]
    fn prop_write_then_read_at_every_offset(
        lead in 0u32..8,
        bits in 1u32..=64,
        value in any::<u64>(),
    ) {
        let mut writer = BitWriter::new();
        writer.write_bits(0, lead).unwrap();
        writer.write_bits(mask_value(bits, value), bits).unwrap();
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        reader.skip_bits(lead as usize).unwrap();
        prop_assert_eq!(reader.read_bits(bits).unwrap(), mask_value(bits, value));
    }

    #[test]
    fn prop_fast_path_matches_bitwise(
        bytes in prop::collection::vec(any::<u8>(), 8..16),
        width_bytes in 1u32..=8,
    ) {
        let bits = width_bytes * 8;
        let mut fast = BitReader::new(&bytes);
        let fast_value = fast.read_bits(bits).unwrap();

        let mut slow = BitReader::new(&bytes);
        let mut slow_value = 0u64;
        for i in 0..bits {
            if slow.read_bit().unwrap() {
                slow_value |= 1 << i;
            }
        }
        prop_assert_eq!(fast_value, slow_value);
        prop_assert_eq!(fast.bit_position(), slow.bit_position());
    }

    #[test]
    fn prop_patch_leaves_neighbours(
        before in any::<u32>(),
        patch in any::<u16>(),
        offset in 0usize..16,
    ) {
        let mut writer = BitWriter::new();
        writer.write_u32_aligned(before).unwrap();
        writer.write_u32_aligned(u32::MAX).unwrap();
        writer.write_at(u64::from(patch), 16, offset).unwrap();
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        let head = reader.read_bits(offset as u32).unwrap();
        prop_assert_eq!(head, mask_value(offset as u32, u64::from(before)));
        prop_assert_eq!(reader.read_bits(16).unwrap(), u64::from(patch));
    }

    #[test]
    fn prop_value32_float_bits(value in any::<f32>()) {
        let boxed = Value32::from_f32(value);
        prop_assert_eq!(boxed.as_u32(), value.to_bits());
        prop_assert_eq!(boxed, Value32::from_u32(value.to_bits()));
    }
}
