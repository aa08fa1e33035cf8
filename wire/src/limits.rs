//! Decode bounds for untrusted packets.

/// Bounds checked by [`decode_packet`](crate::decode_packet) before any
/// section body is handed to the codec.
///
/// Counts inside a section (events, removals, deltas, commands) are bounded
/// by the codec's own limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Largest accepted packet, header included.
    pub max_packet_bytes: usize,
    /// Largest accepted number of framed sections.
    pub max_sections: usize,
    /// Largest accepted section body.
    pub max_section_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_packet_bytes: 64 * 1024,
            max_sections: 16,
            max_section_len: 32 * 1024,
        }
    }
}

impl Limits {
    /// Small bounds for tests.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_packet_bytes: 4096,
            max_sections: 8,
            max_section_len: 1024,
        }
    }

    /// Bounds matching a sender that never exceeds `max_packet_bytes`.
    ///
    /// No section can be longer than the packet that carries it, and a packet
    /// carries at most one section of each of the four kinds.
    #[must_use]
    pub const fn for_packet_budget(max_packet_bytes: usize) -> Self {
        Self {
            max_packet_bytes,
            max_sections: 4,
            max_section_len: max_packet_bytes.saturating_sub(crate::HEADER_SIZE),
        }
    }

    /// No bounds at all. Only for trusted input.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_packet_bytes: usize::MAX,
            max_sections: usize::MAX,
            max_section_len: usize::MAX,
        }
    }
}
