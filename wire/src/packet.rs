//! Packet framing: header bytes plus tagged, length-prefixed sections.

use crate::error::{DecodeError, EncodeError, LimitKind, SectionFramingError, WireResult};
use crate::header::{PacketFlags, PacketHeader, HEADER_SIZE, MAGIC, VERSION};
use crate::limits::Limits;

/// Section tags for version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum SectionTag {
    /// Reliable events (ascending id) followed by unreliable events.
    Events = 1,
    /// Removed-entity markers.
    Removals = 2,
    /// Entity deltas and full states.
    Deltas = 3,
    /// Per-tick commands for controlled entities.
    Commands = 4,
}

impl SectionTag {
    pub fn parse(tag: u8) -> Result<Self, DecodeError> {
        Ok(match tag {
            1 => Self::Events,
            2 => Self::Removals,
            3 => Self::Deltas,
            4 => Self::Commands,
            _ => return Err(DecodeError::UnknownSectionTag { tag }),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireSection<'a> {
    pub tag: SectionTag,
    pub body: &'a [u8],
}

/// A framed packet whose section bodies still borrow the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePacket<'a> {
    pub header: PacketHeader,
    pub sections: Vec<WireSection<'a>>,
}

/// Reads fixed-width little-endian fields from the header region.
struct HeaderCursor<'a> {
    rest: &'a [u8],
}

impl<'a> HeaderCursor<'a> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let (head, rest) = self.rest.split_at(N);
        self.rest = rest;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        out
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }
}

/// Validates the header and splits the payload into sections.
///
/// Header checks run in wire order, so the first bad field decides the
/// error. Section bodies are returned unparsed.
pub fn decode_packet<'a>(buf: &'a [u8], limits: &Limits) -> WireResult<WirePacket<'a>> {
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError::PacketTooSmall {
            actual: buf.len(),
            required: HEADER_SIZE,
        });
    }
    check_limit(LimitKind::PacketBytes, buf.len(), limits.max_packet_bytes)?;

    let (head, payload) = buf.split_at(HEADER_SIZE);
    let mut cursor = HeaderCursor { rest: head };

    let magic = cursor.u32();
    if magic != MAGIC {
        return Err(DecodeError::InvalidMagic { found: magic });
    }
    let version = cursor.u16();
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion { found: version });
    }
    let raw_flags = cursor.u16();
    let flags = PacketFlags::from_raw(raw_flags);
    if !flags.is_valid() {
        return Err(DecodeError::InvalidFlags { flags: raw_flags });
    }

    let header = PacketHeader {
        version,
        flags,
        registry_hash: cursor.u64(),
        tick: cursor.u32(),
        ack_tick: cursor.u32(),
        ack_event_id: cursor.u32(),
        payload_len: cursor.u32(),
    };
    if header.payload_len as usize != payload.len() {
        return Err(DecodeError::PayloadLengthMismatch {
            header_len: header.payload_len,
            actual_len: payload.len(),
        });
    }

    let sections = decode_sections(payload, limits)?;
    Ok(WirePacket { header, sections })
}

/// Splits a header-less payload into sections.
pub fn decode_sections<'a>(
    mut payload: &'a [u8],
    limits: &Limits,
) -> WireResult<Vec<WireSection<'a>>> {
    let mut sections = Vec::new();
    while let Some((&tag, rest)) = payload.split_first() {
        check_limit(
            LimitKind::SectionCount,
            sections.len() + 1,
            limits.max_sections,
        )?;
        let (len, rest) = read_varu32(rest)?;
        let len = len as usize;
        check_limit(LimitKind::SectionLength, len, limits.max_section_len)?;
        if len > rest.len() {
            return Err(SectionFramingError::Truncated {
                needed: len,
                available: rest.len(),
            }
            .into());
        }

        let (body, rest) = rest.split_at(len);
        sections.push(WireSection {
            tag: SectionTag::parse(tag)?,
            body,
        });
        payload = rest;
    }
    Ok(sections)
}

/// Writes `header` into the first [`HEADER_SIZE`] bytes of `out`.
pub fn encode_header(header: &PacketHeader, out: &mut [u8]) -> Result<usize, EncodeError> {
    let Some(dst) = out.get_mut(..HEADER_SIZE) else {
        return Err(EncodeError::BufferTooSmall {
            needed: HEADER_SIZE,
            available: out.len(),
        });
    };
    let mut at = 0;
    let mut put = |bytes: &[u8]| {
        dst[at..at + bytes.len()].copy_from_slice(bytes);
        at += bytes.len();
    };
    put(&MAGIC.to_le_bytes());
    put(&header.version.to_le_bytes());
    put(&header.flags.raw().to_le_bytes());
    put(&header.registry_hash.to_le_bytes());
    put(&header.tick.to_le_bytes());
    put(&header.ack_tick.to_le_bytes());
    put(&header.ack_event_id.to_le_bytes());
    put(&header.payload_len.to_le_bytes());
    Ok(HEADER_SIZE)
}

/// Appends one framed section to `out` and returns the bytes appended.
pub fn encode_section(
    tag: SectionTag,
    body: &[u8],
    out: &mut Vec<u8>,
) -> Result<usize, EncodeError> {
    let len = u32::try_from(body.len())
        .map_err(|_| EncodeError::LengthOverflow { length: body.len() })?;
    let start = out.len();
    out.push(tag as u8);
    write_varu32(len, out);
    out.extend_from_slice(body);
    Ok(out.len() - start)
}

/// Prepends a header to an already-framed payload, filling in `payload_len`.
pub fn encode_packet(header: &PacketHeader, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let payload_len = u32::try_from(payload.len()).map_err(|_| EncodeError::LengthOverflow {
        length: payload.len(),
    })?;
    let mut out = vec![0u8; HEADER_SIZE];
    encode_header(
        &PacketHeader {
            payload_len,
            ..*header
        },
        &mut out,
    )?;
    out.extend_from_slice(payload);
    Ok(out)
}

/// Framed size of a section whose body is `body_len` bytes.
#[must_use]
pub fn section_len(body_len: usize) -> usize {
    let prefix = match body_len {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    };
    1 + prefix + body_len
}

fn check_limit(kind: LimitKind, actual: usize, limit: usize) -> WireResult<()> {
    if actual > limit {
        return Err(DecodeError::LimitsExceeded {
            kind,
            limit,
            actual,
        });
    }
    Ok(())
}

// LEB128, at most five bytes.
fn read_varu32(buf: &[u8]) -> Result<(u32, &[u8]), SectionFramingError> {
    let mut value = 0u32;
    for (i, &byte) in buf.iter().take(5).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, &buf[i + 1..]));
        }
    }
    if buf.len() < 5 {
        return Err(SectionFramingError::Truncated {
            needed: buf.len() + 1,
            available: buf.len(),
        });
    }
    Err(SectionFramingError::InvalidVarint)
}

fn write_varu32(mut value: u32, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}
