use bitstream::{BitError, BitReader, BitWriter, Value32};

#[test]
fn packed_record_roundtrip() {
    // A 7-bit, a 20-bit and a signed 5-bit column packed back to back.
    let mut writer = BitWriter::new();
    writer.write_bits(99, 7).unwrap();
    writer.write_bits(12_345, 20).unwrap();
    writer.write_bits_signed(-7, 5).unwrap();
    assert_eq!(writer.bits_written(), 32);
    let bytes = writer.finish();
    assert_eq!(bytes.len(), 4);

    let mut reader = BitReader::new(&bytes);
    assert_eq!(reader.read_bits(7).unwrap(), 99);
    assert_eq!(reader.read_bits(20).unwrap(), 12_345);
    assert_eq!(reader.read_bits_signed(5).unwrap(), -7);
    assert!(reader.is_empty());
}

#[test]
fn packed_value_matches_little_endian_layout() {
    let mut writer = BitWriter::new();
    writer.write_bits(0, 4).unwrap();
    writer.write_bits(0xABC, 12).unwrap();
    let bytes = writer.finish();
    let word = u16::from_le_bytes([bytes[0], bytes[1]]);
    assert_eq!(word >> 4, 0xABC);
}

#[test]
fn seek_and_read_field() {
    let data = [0x00, 0x00, 0x78, 0x56, 0x34, 0x12];
    let mut reader = BitReader::at_byte(&data, 2).unwrap();
    assert_eq!(reader.read_u32_aligned().unwrap(), 0x1234_5678);
    reader.seek_bits(16).unwrap();
    assert_eq!(reader.read_bits(32).unwrap(), 0x1234_5678);
}

#[test]
fn over_read_reports_eof() {
    let data = [0xFFu8; 3];
    let mut reader = BitReader::new(&data);
    reader.read_bits(20).unwrap();
    let err = reader.read_bits(8).unwrap_err();
    assert!(matches!(err, BitError::UnexpectedEof { requested: 8, available: 4 }));
}

#[test]
fn backfill_string_offsets() {
    let mut writer = BitWriter::new();
    for _ in 0..3 {
        writer.write_bits(5, 3).unwrap();
        writer.write_bits(0, 32).unwrap();
    }
    for (row, offset) in [11u64, 22, 33].into_iter().enumerate() {
        writer.write_at(offset, 32, row * 35 + 3).unwrap();
    }
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    for expected in [11, 22, 33] {
        assert_eq!(reader.read_bits(3).unwrap(), 5);
        assert_eq!(reader.read_bits(32).unwrap(), expected);
    }
}

#[test]
fn sparse_row_framing() {
    let mut writer = BitWriter::new();
    writer.write_u16_aligned(7).unwrap();
    writer.write_cstring(b"abc").unwrap();
    writer.resize_to_multiple(4);
    assert_eq!(writer.byte_len(), 8);
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    assert_eq!(reader.read_u16_aligned().unwrap(), 7);
    assert_eq!(reader.read_cstring().unwrap(), b"abc");
    assert_eq!(reader.read_bytes(2).unwrap(), &[0, 0]);
}

#[test]
fn value_box_reinterprets_packed_bits() {
    let mut writer = BitWriter::new();
    writer
        .write_bits(u64::from(Value32::from_f32(1.5).as_u32()), 32)
        .unwrap();
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    let boxed = Value32::from_u32(reader.read_bits(32).unwrap() as u32);
    assert!((boxed.as_f32() - 1.5).abs() < f32::EPSILON);
}
