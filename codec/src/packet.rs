//! Server and client packets.
//!
//! Both directions share the wire header; the payload is a sequence of
//! sections, each a bit-packed body starting with a 16-bit item count.
//! Empty sections are omitted.

use std::sync::Arc;

use bitstream::{BitReader, BitWriter};
use schema::{registry_hash, FieldValue, Registry, TypeDef};
use tracing::debug;
use wire::{decode_packet, encode_packet, encode_section, SectionTag, WirePacket, HEADER_SIZE};

use crate::delta::StateDelta;
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::event::Event;
use crate::field::{read_values, values_bits, write_values};
use crate::limits::CodecLimits;
use crate::{EntityId, EventId, Tick};

const COUNT_BITS: u8 = 16;
const ENTITY_BITS: u8 = 32;
const TICK_BITS: u8 = 32;

/// Worst-case framing bytes per section (tag + 5-byte varint).
const SECTION_FRAMING_BYTES: usize = 6;
/// Count prefix plus worst-case padding per section.
const SECTION_OVERHEAD_BITS: usize = COUNT_BITS as usize + 7;

/// Acknowledgment state carried by every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// The sender's tick.
    pub tick: Tick,
    /// Newest tick the sender has received from the remote.
    pub ack_tick: Tick,
    /// Highest reliable event id the sender has processed.
    pub ack_event_id: EventId,
}

impl PacketHeader {
    #[must_use]
    pub const fn new(tick: Tick, ack_tick: Tick, ack_event_id: EventId) -> Self {
        Self {
            tick,
            ack_tick,
            ack_event_id,
        }
    }
}

/// Per-tick input for a controlled entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub entity: EntityId,
    pub tick: Tick,
    pub fields: Vec<FieldValue>,
}

/// A server-to-client packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPacket {
    pub header: PacketHeader,
    /// Reliable events in ascending id order, then unreliable events.
    pub events: Vec<Event>,
    pub removals: Vec<EntityId>,
    pub deltas: Vec<StateDelta>,
}

impl ServerPacket {
    #[must_use]
    pub fn new(header: PacketHeader) -> Self {
        Self {
            header,
            events: Vec::new(),
            removals: Vec::new(),
            deltas: Vec::new(),
        }
    }
}

/// A client-to-server packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPacket {
    pub header: PacketHeader,
    pub events: Vec<Event>,
    pub commands: Vec<Command>,
}

impl ClientPacket {
    #[must_use]
    pub fn new(header: PacketHeader) -> Self {
        Self {
            header,
            events: Vec::new(),
            commands: Vec::new(),
        }
    }
}

/// Payload bits available to section items in a packet of at most
/// `max_packet_bytes` carrying `sections` sections.
///
/// Conservative: assumes worst-case framing and padding for every section.
#[must_use]
pub fn payload_bits_budget(max_packet_bytes: usize, sections: usize) -> usize {
    max_packet_bytes
        .saturating_sub(HEADER_SIZE + sections * SECTION_FRAMING_BYTES)
        .saturating_mul(8)
        .saturating_sub(sections * SECTION_OVERHEAD_BITS)
}

/// Encodes and decodes packets against one registry.
#[derive(Debug, Clone)]
pub struct PacketCodec {
    registry: Arc<Registry>,
    hash: u64,
    wire_limits: wire::Limits,
    limits: CodecLimits,
}

impl PacketCodec {
    /// Creates a codec with default limits.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Schema`] if the registry is invalid.
    pub fn new(registry: Arc<Registry>) -> CodecResult<Self> {
        registry.validate()?;
        let hash = registry_hash(&registry);
        Ok(Self {
            registry,
            hash,
            wire_limits: wire::Limits::default(),
            limits: CodecLimits::default(),
        })
    }

    /// Replaces the decode limits.
    #[must_use]
    pub fn with_limits(mut self, wire_limits: wire::Limits, limits: CodecLimits) -> Self {
        self.wire_limits = wire_limits;
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn registry_hash(&self) -> u64 {
        self.hash
    }

    #[must_use]
    pub fn wire_limits(&self) -> &wire::Limits {
        &self.wire_limits
    }

    #[must_use]
    pub fn limits(&self) -> &CodecLimits {
        &self.limits
    }

    /// Encoded bits of one command item.
    pub fn command_bits(&self) -> CodecResult<usize> {
        let def = self.command_def()?;
        Ok(ENTITY_BITS as usize + TICK_BITS as usize + values_bits(def))
    }

    pub fn encode_server(&self, packet: &ServerPacket) -> CodecResult<Vec<u8>> {
        let mut payload = Vec::new();
        if !packet.events.is_empty() {
            self.write_events(&packet.events, &mut payload)?;
        }
        if !packet.removals.is_empty() {
            self.check_count(LimitKind::Removals, packet.removals.len())?;
            let mut writer = BitWriter::new();
            writer.write_bits(packet.removals.len() as u64, COUNT_BITS)?;
            for entity in &packet.removals {
                writer.write_bits(u64::from(entity.raw()), ENTITY_BITS)?;
            }
            encode_section(SectionTag::Removals, &writer.finish(), &mut payload)?;
        }
        if !packet.deltas.is_empty() {
            self.check_count(LimitKind::Deltas, packet.deltas.len())?;
            let mut writer = BitWriter::new();
            writer.write_bits(packet.deltas.len() as u64, COUNT_BITS)?;
            for delta in &packet.deltas {
                delta.encode(&mut writer, &self.registry)?;
            }
            encode_section(SectionTag::Deltas, &writer.finish(), &mut payload)?;
        }

        let header = self.wire_header(true, &packet.header);
        Ok(encode_packet(&header, &payload)?)
    }

    pub fn encode_client(&self, packet: &ClientPacket) -> CodecResult<Vec<u8>> {
        let mut payload = Vec::new();
        if !packet.events.is_empty() {
            self.write_events(&packet.events, &mut payload)?;
        }
        if !packet.commands.is_empty() {
            self.check_count(LimitKind::Commands, packet.commands.len())?;
            let def = self.command_def()?;
            let mut writer = BitWriter::new();
            writer.write_bits(packet.commands.len() as u64, COUNT_BITS)?;
            for command in &packet.commands {
                writer.write_bits(u64::from(command.entity.raw()), ENTITY_BITS)?;
                writer.write_bits(u64::from(command.tick.raw()), TICK_BITS)?;
                write_values(&mut writer, def, &command.fields)?;
            }
            encode_section(SectionTag::Commands, &writer.finish(), &mut payload)?;
        }

        let header = self.wire_header(false, &packet.header);
        Ok(encode_packet(&header, &payload)?)
    }

    pub fn decode_server(&self, buf: &[u8]) -> CodecResult<ServerPacket> {
        let wire_packet = decode_packet(buf, &self.wire_limits)?;
        let header = self.check_header(&wire_packet, true)?;
        let mut packet = ServerPacket::new(header);
        let mut seen = Vec::with_capacity(wire_packet.sections.len());

        for section in &wire_packet.sections {
            check_duplicate(&mut seen, section.tag)?;
            let mut reader = BitReader::new(section.body);
            match section.tag {
                SectionTag::Events => packet.events = self.read_events(&mut reader)?,
                SectionTag::Removals => {
                    let count = self.read_count(&mut reader, LimitKind::Removals)?;
                    packet.removals = (0..count)
                        .map(|_| -> CodecResult<EntityId> {
                            Ok(EntityId::new(reader.read_bits(ENTITY_BITS)? as u32))
                        })
                        .collect::<CodecResult<_>>()?;
                }
                SectionTag::Deltas => {
                    let count = self.read_count(&mut reader, LimitKind::Deltas)?;
                    packet.deltas = (0..count)
                        .map(|_| StateDelta::decode(&mut reader, &self.registry))
                        .collect::<CodecResult<_>>()?;
                }
                SectionTag::Commands | _ => {
                    return Err(CodecError::UnexpectedSection {
                        section: section.tag,
                    })
                }
            }
            finish_section(&reader, section.tag)?;
        }
        Ok(packet)
    }

    pub fn decode_client(&self, buf: &[u8]) -> CodecResult<ClientPacket> {
        let wire_packet = decode_packet(buf, &self.wire_limits)?;
        let header = self.check_header(&wire_packet, false)?;
        let mut packet = ClientPacket::new(header);
        let mut seen = Vec::with_capacity(wire_packet.sections.len());

        for section in &wire_packet.sections {
            check_duplicate(&mut seen, section.tag)?;
            let mut reader = BitReader::new(section.body);
            match section.tag {
                SectionTag::Events => packet.events = self.read_events(&mut reader)?,
                SectionTag::Commands => {
                    let def = self.command_def()?;
                    let count = self.read_count(&mut reader, LimitKind::Commands)?;
                    let mut commands = Vec::with_capacity(count);
                    for _ in 0..count {
                        let entity = EntityId::new(reader.read_bits(ENTITY_BITS)? as u32);
                        let tick = Tick::new(reader.read_bits(TICK_BITS)? as u32);
                        let fields = read_values(&mut reader, def)?;
                        commands.push(Command {
                            entity,
                            tick,
                            fields,
                        });
                    }
                    packet.commands = commands;
                }
                SectionTag::Removals | SectionTag::Deltas | _ => {
                    return Err(CodecError::UnexpectedSection {
                        section: section.tag,
                    })
                }
            }
            finish_section(&reader, section.tag)?;
        }
        Ok(packet)
    }

    fn wire_header(&self, from_server: bool, header: &PacketHeader) -> wire::PacketHeader {
        let ack_event_id = u32::try_from(header.ack_event_id.raw()).unwrap_or(0);
        if from_server {
            wire::PacketHeader::server(
                self.hash,
                header.tick.raw(),
                header.ack_tick.raw(),
                ack_event_id,
                0,
            )
        } else {
            wire::PacketHeader::client(
                self.hash,
                header.tick.raw(),
                header.ack_tick.raw(),
                ack_event_id,
                0,
            )
        }
    }

    fn check_header(&self, packet: &WirePacket<'_>, from_server: bool) -> CodecResult<PacketHeader> {
        let header = &packet.header;
        if header.flags.is_from_server() != from_server {
            return Err(CodecError::UnexpectedDirection);
        }
        if header.registry_hash != self.hash {
            return Err(CodecError::RegistryMismatch {
                expected: self.hash,
                found: header.registry_hash,
            });
        }
        if header.ack_event_id > EventId::MAX.raw() as u32 {
            return Err(CodecError::InvalidEventId {
                raw: header.ack_event_id,
            });
        }
        Ok(PacketHeader {
            tick: Tick::new(header.tick),
            ack_tick: Tick::new(header.ack_tick),
            ack_event_id: EventId::new(header.ack_event_id as i32),
        })
    }

    fn write_events(&self, events: &[Event], payload: &mut Vec<u8>) -> CodecResult<()> {
        self.check_count(LimitKind::Events, events.len())?;
        let mut writer = BitWriter::new();
        writer.write_bits(events.len() as u64, COUNT_BITS)?;
        for event in events {
            event.encode(&mut writer, &self.registry)?;
        }
        encode_section(SectionTag::Events, &writer.finish(), payload)?;
        Ok(())
    }

    fn read_events(&self, reader: &mut BitReader<'_>) -> CodecResult<Vec<Event>> {
        let count = self.read_count(reader, LimitKind::Events)?;
        (0..count)
            .map(|_| Event::decode(reader, &self.registry))
            .collect()
    }

    fn read_count(&self, reader: &mut BitReader<'_>, kind: LimitKind) -> CodecResult<usize> {
        let count = reader.read_bits(COUNT_BITS)? as usize;
        self.check_count(kind, count)?;
        Ok(count)
    }

    fn check_count(&self, kind: LimitKind, actual: usize) -> CodecResult<()> {
        let limit = match kind {
            LimitKind::Events => self.limits.max_events,
            LimitKind::Removals => self.limits.max_removals,
            LimitKind::Deltas => self.limits.max_deltas,
            LimitKind::Commands => self.limits.max_commands,
        }
        .min(CodecLimits::MAX_COUNT);
        if actual > limit {
            return Err(CodecError::LimitsExceeded {
                kind,
                limit,
                actual,
            });
        }
        Ok(())
    }

    fn command_def(&self) -> CodecResult<&TypeDef> {
        self.registry
            .command()
            .ok_or(CodecError::MissingCommandLayout)
    }
}

fn check_duplicate(seen: &mut Vec<SectionTag>, tag: SectionTag) -> CodecResult<()> {
    if seen.contains(&tag) {
        return Err(CodecError::DuplicateSection { section: tag });
    }
    seen.push(tag);
    Ok(())
}

fn finish_section(reader: &BitReader<'_>, section: SectionTag) -> CodecResult<()> {
    if reader.only_padding_left() {
        return Ok(());
    }
    debug!(?section, remaining = reader.bits_remaining(), "section has trailing data");
    Err(CodecError::TrailingSectionData {
        section,
        remaining_bits: reader.bits_remaining(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{FieldCodec, FieldDef, FieldId, TypeKind};

    use crate::State;

    fn kind(v: u16) -> TypeKind {
        TypeKind::new(v).unwrap()
    }

    fn fid(v: u16) -> FieldId {
        FieldId::new(v).unwrap()
    }

    fn registry() -> Arc<Registry> {
        Arc::new(
            Registry::builder()
                .state(TypeDef::new(kind(1)).field(FieldDef::new(fid(1), FieldCodec::uint(10))))
                .event(TypeDef::new(kind(1)).field(FieldDef::new(fid(1), FieldCodec::bool())))
                .command(TypeDef::new(kind(1)).field(FieldDef::new(fid(1), FieldCodec::sint(4))))
                .build()
                .unwrap(),
        )
    }

    fn codec() -> PacketCodec {
        PacketCodec::new(registry()).unwrap()
    }

    fn header() -> PacketHeader {
        PacketHeader::new(Tick::new(12), Tick::new(9), EventId::new(4))
    }

    #[test]
    fn server_packet_roundtrip() {
        let codec = codec();
        let mut packet = ServerPacket::new(header());
        let mut event = Event::new(kind(1), vec![FieldValue::Bool(true)]);
        event.id = EventId::new(5);
        packet.events.push(event);
        packet.events.push(Event::new(kind(1), vec![FieldValue::Bool(false)]));
        packet.removals = vec![EntityId::new(3), EntityId::new(8)];
        let state = State::from_values(kind(1), vec![FieldValue::UInt(1000)]);
        packet.deltas.push(StateDelta::full(EntityId::new(2), &state));

        let bytes = codec.encode_server(&packet).unwrap();
        assert_eq!(codec.decode_server(&bytes).unwrap(), packet);
    }

    #[test]
    fn client_packet_roundtrip() {
        let codec = codec();
        let mut packet = ClientPacket::new(header());
        packet.commands.push(Command {
            entity: EntityId::new(1),
            tick: Tick::new(12),
            fields: vec![FieldValue::SInt(-8)],
        });
        let bytes = codec.encode_client(&packet).unwrap();
        assert_eq!(codec.decode_client(&bytes).unwrap(), packet);
    }

    #[test]
    fn empty_packet_is_header_only() {
        let codec = codec();
        let packet = ServerPacket::new(PacketHeader::new(
            Tick::START,
            Tick::INVALID,
            EventId::INVALID,
        ));
        let bytes = codec.encode_server(&packet).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = codec.decode_server(&bytes).unwrap();
        assert_eq!(decoded.header.ack_tick, Tick::INVALID);
        assert_eq!(decoded.header.ack_event_id, EventId::INVALID);
    }

    #[test]
    fn wrong_direction_rejected() {
        let codec = codec();
        let bytes = codec.encode_client(&ClientPacket::new(header())).unwrap();
        assert_eq!(
            codec.decode_server(&bytes).unwrap_err(),
            CodecError::UnexpectedDirection
        );
    }

    #[test]
    fn registry_mismatch_rejected() {
        let other = Arc::new(
            Registry::builder()
                .state(TypeDef::new(kind(2)))
                .build()
                .unwrap(),
        );
        let bytes = PacketCodec::new(other)
            .unwrap()
            .encode_server(&ServerPacket::new(header()))
            .unwrap();
        assert!(matches!(
            codec().decode_server(&bytes),
            Err(CodecError::RegistryMismatch { .. })
        ));
    }

    #[test]
    fn commands_in_server_packet_rejected() {
        let codec = codec();
        let mut payload = Vec::new();
        encode_section(SectionTag::Commands, &[0, 0], &mut payload).unwrap();
        let header = wire::PacketHeader::server(codec.registry_hash(), 1, 0, 0, 0);
        let bytes = encode_packet(&header, &payload).unwrap();
        assert!(matches!(
            codec.decode_server(&bytes),
            Err(CodecError::UnexpectedSection {
                section: SectionTag::Commands
            })
        ));
    }

    #[test]
    fn duplicate_section_rejected() {
        let codec = codec();
        let mut payload = Vec::new();
        encode_section(SectionTag::Removals, &[0, 0], &mut payload).unwrap();
        encode_section(SectionTag::Removals, &[0, 0], &mut payload).unwrap();
        let header = wire::PacketHeader::server(codec.registry_hash(), 1, 0, 0, 0);
        let bytes = encode_packet(&header, &payload).unwrap();
        assert!(matches!(
            codec.decode_server(&bytes),
            Err(CodecError::DuplicateSection { .. })
        ));
    }

    #[test]
    fn trailing_section_data_rejected() {
        let codec = codec();
        let mut payload = Vec::new();
        encode_section(SectionTag::Removals, &[0, 0, 0xFF], &mut payload).unwrap();
        let header = wire::PacketHeader::server(codec.registry_hash(), 1, 0, 0, 0);
        let bytes = encode_packet(&header, &payload).unwrap();
        assert!(matches!(
            codec.decode_server(&bytes),
            Err(CodecError::TrailingSectionData { .. })
        ));
    }

    #[test]
    fn invalid_ack_event_id_rejected() {
        let codec = codec();
        let header = wire::PacketHeader::server(codec.registry_hash(), 1, 0, 70_000, 0);
        let bytes = encode_packet(&header, &[]).unwrap();
        assert_eq!(
            codec.decode_server(&bytes).unwrap_err(),
            CodecError::InvalidEventId { raw: 70_000 }
        );
    }

    #[test]
    fn decode_enforces_count_limits() {
        let codec = codec();
        let mut packet = ServerPacket::new(header());
        packet.removals = (1..=20).map(EntityId::new).collect();
        let bytes = codec.encode_server(&packet).unwrap();

        let strict = codec
            .clone()
            .with_limits(wire::Limits::default(), CodecLimits::for_testing());
        assert!(strict.decode_server(&bytes).is_ok());

        packet.removals = (1..=40).map(EntityId::new).collect();
        let bytes = codec.encode_server(&packet).unwrap();
        assert!(matches!(
            strict.decode_server(&bytes),
            Err(CodecError::LimitsExceeded {
                kind: LimitKind::Removals,
                limit: 32,
                actual: 40
            })
        ));
    }

    #[test]
    fn truncated_packet_rejected() {
        let codec = codec();
        let mut packet = ServerPacket::new(header());
        packet.removals.push(EntityId::new(1));
        let bytes = codec.encode_server(&packet).unwrap();
        assert!(matches!(
            codec.decode_server(&bytes[..bytes.len() - 1]),
            Err(CodecError::Wire(_))
        ));
    }

    #[test]
    fn missing_command_layout() {
        let registry = Arc::new(
            Registry::builder()
                .state(TypeDef::new(kind(1)))
                .build()
                .unwrap(),
        );
        let codec = PacketCodec::new(registry).unwrap();
        let mut packet = ClientPacket::new(header());
        packet.commands.push(Command {
            entity: EntityId::new(1),
            tick: Tick::new(1),
            fields: vec![],
        });
        assert_eq!(
            codec.encode_client(&packet).unwrap_err(),
            CodecError::MissingCommandLayout
        );
        assert!(codec.command_bits().is_err());
    }

    #[test]
    fn budget_accounts_for_framing() {
        let budget = payload_bits_budget(HEADER_SIZE + 100, 2);
        assert_eq!(budget, (100 - 12) * 8 - 2 * 23);
        assert_eq!(payload_bits_budget(10, 3), 0);
    }
}
