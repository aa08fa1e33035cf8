//! Runtime configuration.

use std::num::NonZeroUsize;

use codec::{Attempts, CodecLimits, WireLimits};
use scope::ScopeBudget;

use crate::error::{Error, Result};

/// Knobs shared by [`Server`](crate::Server) and [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SyncConfig {
    /// The server sends on ticks divisible by this interval.
    pub server_send_rate: u32,
    /// The client sends on local ticks divisible by this interval.
    pub client_send_rate: u32,
    /// Snapshots kept for delta baselines, and received states kept per
    /// entity on the client.
    pub history_len: usize,
    /// Upper bound on an encoded packet.
    pub max_packet_bytes: usize,
    /// Attempt budget used by `broadcast_event` and friends when none is given.
    pub default_attempts: Attempts,
    /// Decode limits for packet sections.
    pub codec_limits: CodecLimits,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_send_rate: 2,
            client_send_rate: 2,
            history_len: 64,
            max_packet_bytes: 1200,
            default_attempts: Attempts::default(),
            codec_limits: CodecLimits::default(),
        }
    }
}

impl SyncConfig {
    /// Small, every-tick configuration for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            server_send_rate: 1,
            client_send_rate: 1,
            history_len: 32,
            max_packet_bytes: 1200,
            default_attempts: Attempts::Forever,
            codec_limits: CodecLimits::for_testing(),
        }
    }

    /// Checks that the configuration can drive a connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.server_send_rate == 0 || self.client_send_rate == 0 {
            return Err(Error::InvalidConfig {
                reason: "send rate must be positive",
            });
        }
        if self.history_len == 0 {
            return Err(Error::InvalidConfig {
                reason: "history length must be positive",
            });
        }
        if self.max_packet_bytes <= wire::HEADER_SIZE {
            return Err(Error::InvalidConfig {
                reason: "packet budget does not fit the header",
            });
        }
        let limits = &self.codec_limits;
        if [
            limits.max_events,
            limits.max_removals,
            limits.max_deltas,
            limits.max_commands,
        ]
        .iter()
        .any(|&limit| limit > CodecLimits::MAX_COUNT)
        {
            return Err(Error::InvalidConfig {
                reason: "codec limit exceeds the section count prefix",
            });
        }
        Ok(())
    }

    pub(crate) fn history_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.history_len).unwrap_or(NonZeroUsize::MIN)
    }

    pub(crate) fn wire_limits(&self) -> WireLimits {
        WireLimits::for_packet_budget(self.max_packet_bytes)
    }

    /// Per-packet section counts a peer's scope may fill.
    pub(crate) fn scope_budget(&self) -> ScopeBudget {
        ScopeBudget {
            max_deltas: self.codec_limits.max_deltas,
            max_removals: self.codec_limits.max_removals,
        }
    }
}
