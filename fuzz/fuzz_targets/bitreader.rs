#![no_main]

use bitstream::BitReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Use input bytes to drive a bounded sequence of operations.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 7;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_bit();
            }
            1 => {
                let bits = u32::from(data[idx.saturating_sub(1)] % 65);
                let _ = reader.read_bits(bits);
            }
            2 => {
                let bits = u32::from(data[idx.saturating_sub(1)] % 65);
                let _ = reader.read_bits_signed(bits);
            }
            3 => {
                let _ = reader.align_to_byte();
            }
            4 => {
                let _ = reader.read_u32_aligned();
            }
            5 => {
                let _ = reader.read_cstring();
            }
            _ => {
                let target = usize::from(data[idx.saturating_sub(1)]) * 3;
                let _ = reader.seek_bits(target);
            }
        }
    }
});
