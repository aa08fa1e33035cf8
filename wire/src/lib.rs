//! Wire framing and packet layout for ticksync.
//!
//! This crate handles the binary wire format: packet headers, section framing,
//! and limit enforcement. It does not know about entities, events or ticks
//! beyond the raw integers carried in the header.
//!
//! # Layout
//!
//! ```text
//! magic:u32 version:u16 flags:u16 registry_hash:u64
//! tick:u32 ack_tick:u32 ack_event_id:u32 payload_len:u32
//! { tag:u8 len:varu32 body[len] }*
//! ```
//!
//! All header integers are little-endian.

mod error;
mod header;
mod limits;
mod packet;

pub use error::{DecodeError, EncodeError, LimitKind, SectionFramingError, WireResult};
pub use header::{PacketFlags, PacketHeader, HEADER_SIZE, MAGIC, VERSION};
pub use limits::Limits;
pub use packet::{
    decode_packet, decode_sections, encode_header, encode_packet, encode_section, section_len,
    SectionTag, WirePacket, WireSection,
};
