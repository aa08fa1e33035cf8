//! Bit packing for ticksync packets.
//!
//! Values are written most-significant bit first into a [`BitWriter`] and
//! read back through a bounds-checked [`BitReader`]. [`IntEncoder`] maps an
//! integer from a known inclusive range onto the smallest bit width that
//! covers it, which is how every tick, id and ranged field goes on the wire.
//!
//! Nothing here knows about ticks or entities; callers decide the layout.
//! Reads past the end and out-of-range writes come back as [`BitError`].
//!
//! ```
//! use bitstream::{BitReader, BitWriter, IntEncoder};
//!
//! let health = IntEncoder::new(0, 100);
//! let mut writer = BitWriter::new();
//! writer.write_bool(true);
//! health.write(&mut writer, 42).unwrap();
//!
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert!(reader.read_bool().unwrap());
//! assert_eq!(health.read(&mut reader).unwrap(), 42);
//! ```

mod error;
mod int_encoder;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use int_encoder::IntEncoder;
pub use reader::BitReader;
pub use writer::BitWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_written_reads_nothing() {
        let bytes = BitWriter::new().finish();
        assert!(bytes.is_empty());
        assert!(BitReader::new(&bytes).is_empty());
    }

    #[test]
    fn widths_up_to_a_word() {
        for bits in [1u8, 3, 7, 13, 31, 33, 63, 64] {
            let value = if bits == 64 {
                0x8000_0000_0000_0001
            } else {
                (1u64 << (bits - 1)) | 1
            };
            let mut writer = BitWriter::new();
            writer.write_bits(value, bits).unwrap();
            let bytes = writer.finish();
            assert_eq!(bytes.len(), usize::from(bits).div_ceil(8));

            let mut reader = BitReader::new(&bytes);
            assert_eq!(reader.read_bits(bits).unwrap(), value, "{bits}-bit value");
        }
    }

    #[test]
    fn header_like_sequence() {
        let tick = IntEncoder::unsigned(32);
        let event_id = IntEncoder::new(-1, 65_535);
        let mut writer = BitWriter::new();
        tick.write(&mut writer, 1234).unwrap();
        event_id.write(&mut writer, -1).unwrap();
        writer.write_bool(false);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(tick.read(&mut reader).unwrap(), 1234);
        assert_eq!(event_id.read(&mut reader).unwrap(), -1);
        assert!(!reader.read_bool().unwrap());
        assert!(reader.only_padding_left());
    }
}
