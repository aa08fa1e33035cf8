#![no_main]

use bitstream::{BitReader, IntEncoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&ops, payload)) = data.split_first() else {
        return;
    };
    let mut reader = BitReader::new(payload);

    // The first byte seeds a bounded sequence of operations.
    let mut op = ops;
    for _ in 0..256 {
        if reader.is_empty() {
            break;
        }
        match op % 5 {
            0 => {
                let _ = reader.read_bool();
            }
            1 => {
                let _ = reader.read_bits(op % 64 + 1);
            }
            2 => {
                let _ = reader.peek_bits(op % 64 + 1);
            }
            3 => {
                let encoder = IntEncoder::signed(op % 32 + 1);
                if let Ok(value) = encoder.read(&mut reader) {
                    assert!(encoder.contains(value));
                }
            }
            _ => {
                let encoder = IntEncoder::new(-1000, i64::from(op) * 37);
                let _ = encoder.peek(&reader);
            }
        }
        op = op.rotate_left(3).wrapping_add(17);
    }
});
