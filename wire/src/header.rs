//! Packet header types and constants.

/// Magic number identifying ticksync packets.
///
/// This value is fixed and must never change across versions.
pub const MAGIC: u32 = 0x5453_594E; // "TSYN" in ASCII

/// Current wire format version.
pub const VERSION: u16 = 1;

/// Header size in bytes (32 total).
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 8 + 4 + 4 + 4 + 4;

/// Packet direction flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketFlags(u16);

impl PacketFlags {
    /// Set on packets sent by the authoritative server.
    pub const FROM_SERVER: u16 = 1 << 0;

    /// Set on packets sent by a client.
    pub const FROM_CLIENT: u16 = 1 << 1;

    /// Reserved bits mask (must be zero in version 1).
    const RESERVED_MASK: u16 = !0b11;

    /// Creates new flags from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` if the packet was sent by the server.
    #[must_use]
    pub const fn is_from_server(self) -> bool {
        self.0 & Self::FROM_SERVER != 0
    }

    /// Returns `true` if the packet was sent by a client.
    #[must_use]
    pub const fn is_from_client(self) -> bool {
        self.0 & Self::FROM_CLIENT != 0
    }

    /// Returns `true` if the flags are valid for version 1.
    ///
    /// Valid means exactly one direction bit is set and no reserved bits are set.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        let has_reserved = self.0 & Self::RESERVED_MASK != 0;
        (self.is_from_server() ^ self.is_from_client()) && !has_reserved
    }

    /// Flags for a server-to-client packet.
    #[must_use]
    pub const fn server() -> Self {
        Self(Self::FROM_SERVER)
    }

    /// Flags for a client-to-server packet.
    #[must_use]
    pub const fn client() -> Self {
        Self(Self::FROM_CLIENT)
    }
}

/// Packet header.
///
/// This struct represents the header fields *after* the magic number.
/// The magic number is validated separately during decoding and is not
/// stored in this struct.
///
/// Ticks and event ids are carried as raw integers; the codec layer gives
/// them meaning (including the invalid-tick sentinel `u32::MAX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Wire format version.
    pub version: u16,
    /// Direction flags.
    pub flags: PacketFlags,
    /// Registry hash for compatibility checking.
    pub registry_hash: u64,
    /// Sender's tick when the packet was built.
    pub tick: u32,
    /// Newest remote tick the sender has received.
    pub ack_tick: u32,
    /// Newest reliable event id the sender has processed (0 if none).
    pub ack_event_id: u32,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl PacketHeader {
    /// Creates a header for a server-to-client packet.
    #[must_use]
    pub const fn server(
        registry_hash: u64,
        tick: u32,
        ack_tick: u32,
        ack_event_id: u32,
        payload_len: u32,
    ) -> Self {
        Self {
            version: VERSION,
            flags: PacketFlags::server(),
            registry_hash,
            tick,
            ack_tick,
            ack_event_id,
            payload_len,
        }
    }

    /// Creates a header for a client-to-server packet.
    #[must_use]
    pub const fn client(
        registry_hash: u64,
        tick: u32,
        ack_tick: u32,
        ack_event_id: u32,
        payload_len: u32,
    ) -> Self {
        Self {
            version: VERSION,
            flags: PacketFlags::client(),
            registry_hash,
            tick,
            ack_tick,
            ack_event_id,
            payload_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_spells_tsyn() {
        assert_eq!(&MAGIC.to_be_bytes(), b"TSYN");
    }

    #[test]
    fn flags_direction() {
        assert!(PacketFlags::server().is_from_server());
        assert!(!PacketFlags::server().is_from_client());
        assert!(PacketFlags::client().is_from_client());
        assert!(!PacketFlags::client().is_from_server());
    }

    #[test]
    fn flags_validity() {
        assert!(PacketFlags::server().is_valid());
        assert!(PacketFlags::client().is_valid());
        assert!(!PacketFlags::from_raw(0).is_valid());
        assert!(!PacketFlags::from_raw(0b11).is_valid());
        assert!(!PacketFlags::from_raw(0b101).is_valid());
    }

    #[test]
    fn header_constructors() {
        let header = PacketHeader::server(0xAB, 10, 7, 3, 64);
        assert_eq!(header.version, VERSION);
        assert!(header.flags.is_from_server());
        assert_eq!(header.tick, 10);
        assert_eq!(header.ack_tick, 7);
        assert_eq!(header.ack_event_id, 3);
        assert_eq!(header.payload_len, 64);

        let header = PacketHeader::client(0xAB, 1, u32::MAX, 0, 0);
        assert!(header.flags.is_from_client());
        assert_eq!(header.ack_tick, u32::MAX);
    }
}
