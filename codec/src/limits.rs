//! Limits for codec-level decoding.

/// Codec-specific limits enforced while decoding packet sections.
///
/// Counts are also written as 16-bit prefixes, so no limit may exceed
/// [`CodecLimits::MAX_COUNT`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CodecLimits {
    /// Maximum number of events in one packet.
    pub max_events: usize,
    /// Maximum number of removal markers in one packet.
    pub max_removals: usize,
    /// Maximum number of entity deltas in one packet.
    pub max_deltas: usize,
    /// Maximum number of commands in one packet.
    pub max_commands: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_events: 256,
            max_removals: 1024,
            max_deltas: 2048,
            max_commands: 64,
        }
    }
}

impl CodecLimits {
    /// Largest count a section prefix can carry.
    pub const MAX_COUNT: usize = u16::MAX as usize;

    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_events: 16,
            max_removals: 32,
            max_deltas: 64,
            max_commands: 8,
        }
    }

    /// Creates the loosest limits the wire format allows.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_events: Self::MAX_COUNT,
            max_removals: Self::MAX_COUNT,
            max_deltas: Self::MAX_COUNT,
            max_commands: Self::MAX_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_reasonable() {
        let limits = CodecLimits::default();
        assert!(limits.max_deltas >= 128);
        assert!(limits.max_events <= CodecLimits::MAX_COUNT);
    }

    #[test]
    fn testing_limits_smaller() {
        let test_limits = CodecLimits::for_testing();
        let default_limits = CodecLimits::default();
        assert!(test_limits.max_events < default_limits.max_events);
        assert!(test_limits.max_deltas < default_limits.max_deltas);
    }

    #[test]
    fn unlimited_limits_fit_prefix() {
        let limits = CodecLimits::unlimited();
        assert_eq!(limits.max_removals, u16::MAX as usize);
    }
}
