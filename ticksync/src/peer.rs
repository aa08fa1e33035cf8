//! Remote endpoint state shared by both roles.

use std::fmt;

use codec::{Attempts, Event, EventId, EventReceiver, EventSender, PacketHeader, Tick};
use schema::Registry;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::Transport;

/// Server-assigned handle for a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerId(u32);

impl PeerId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One remote endpoint: its transport, both halves of the event layer and
/// the tick bookkeeping that drives acknowledgment.
pub struct Peer {
    transport: Box<dyn Transport>,
    sender: EventSender,
    receiver: EventReceiver,
    /// Newest of our ticks the remote says it received.
    remote_ack: Tick,
    /// Newest remote tick we received a packet for.
    newest_remote: Tick,
    /// Newest remote tick we acknowledge back.
    local_ack: Tick,
    /// Local updates since `newest_remote` arrived.
    elapsed: u32,
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("remote_ack", &self.remote_ack)
            .field("newest_remote", &self.newest_remote)
            .field("local_ack", &self.local_ack)
            .field("pending_events", &self.sender.pending_len())
            .finish_non_exhaustive()
    }
}

impl Peer {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            sender: EventSender::new(),
            receiver: EventReceiver::new(),
            remote_ack: Tick::INVALID,
            newest_remote: Tick::INVALID,
            local_ack: Tick::INVALID,
            elapsed: 0,
        }
    }

    /// Caps events per outbound packet at the remote's decode limit.
    #[must_use]
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.sender = std::mem::take(&mut self.sender).with_max_per_packet(max);
        self
    }

    /// Drops queued reliable events that exceed `bits`, the most event space
    /// one of our packets can offer.
    #[must_use]
    pub fn with_max_event_bits(mut self, bits: usize) -> Self {
        self.sender = std::mem::take(&mut self.sender).with_max_event_bits(bits);
        self
    }

    /// Newest of our ticks the remote has acknowledged, or [`Tick::INVALID`].
    #[must_use]
    pub fn last_acked_tick(&self) -> Tick {
        self.remote_ack
    }

    /// Newest remote tick received, or [`Tick::INVALID`].
    #[must_use]
    pub fn newest_remote_tick(&self) -> Tick {
        self.newest_remote
    }

    /// The remote tick we currently report in our headers.
    #[must_use]
    pub fn local_ack(&self) -> Tick {
        self.local_ack
    }

    /// Best guess of the remote's current tick: the newest received tick
    /// advanced by the local updates since it arrived.
    #[must_use]
    pub fn estimated_remote_tick(&self) -> Tick {
        if !self.newest_remote.is_valid() {
            return Tick::INVALID;
        }
        let raw = self
            .newest_remote
            .raw()
            .saturating_add(self.elapsed)
            .min(Tick::INVALID.raw() - 1);
        Tick::new(raw)
    }

    /// Advances the remote clock estimate by one local update.
    pub fn advance_clock(&mut self) {
        self.elapsed = self.elapsed.saturating_add(1);
    }

    /// Processes the acknowledgment part of an inbound header.
    ///
    /// Returns `false` for a stale packet (not newer than one already
    /// accepted); such packets must be dropped whole.
    pub fn accept_header(&mut self, header: &PacketHeader) -> bool {
        if !header.tick.is_valid() {
            debug!("packet without a sender tick");
            return false;
        }
        if self.newest_remote.is_valid() && header.tick <= self.newest_remote {
            debug!(tick = %header.tick, newest = %self.newest_remote, "stale packet dropped");
            return false;
        }
        self.newest_remote = header.tick;
        self.elapsed = 0;
        if header.ack_tick.is_valid()
            && (!self.remote_ack.is_valid() || header.ack_tick > self.remote_ack)
        {
            self.remote_ack = header.ack_tick;
        }
        self.sender.integrate_ack(header.ack_tick, header.ack_event_id);
        true
    }

    /// Marks a remote tick as fully processed, so later headers acknowledge it.
    pub fn acknowledge(&mut self, tick: Tick) {
        if tick.is_valid() && (!self.local_ack.is_valid() || tick > self.local_ack) {
            self.local_ack = tick;
        }
    }

    /// The header for an outbound packet sent at `tick`.
    #[must_use]
    pub fn header(&self, tick: Tick) -> PacketHeader {
        PacketHeader::new(tick, self.local_ack, self.receiver.last_processed())
    }

    /// Filters inbound events to the ones the application should see.
    pub fn receive_events(&mut self, events: Vec<Event>) -> Vec<Event> {
        self.receiver.receive(events)
    }

    pub fn queue_event(&mut self, event: Event, attempts: Attempts) -> EventId {
        self.sender.queue(event, attempts)
    }

    pub fn send_unreliable(&mut self, event: Event) {
        self.sender.send_unreliable(event);
    }

    /// Reliable events still awaiting acknowledgment.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.sender.pending_len()
    }

    pub(crate) fn pack_events(
        &mut self,
        tick: Tick,
        budget_bits: usize,
        registry: &Registry,
    ) -> Vec<Event> {
        self.sender.pack(tick, budget_bits, registry)
    }

    pub(crate) fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.transport.send(payload)
    }

    pub(crate) fn receive(&mut self) -> Option<Vec<u8>> {
        self.transport.receive()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    fn peer() -> Peer {
        let (local, _remote) = ChannelTransport::pair();
        Peer::new(Box::new(local))
    }

    fn header(tick: u32, ack: Tick) -> PacketHeader {
        PacketHeader::new(Tick::new(tick), ack, EventId::INVALID)
    }

    #[test]
    fn stale_packets_rejected() {
        let mut peer = peer();
        assert!(peer.accept_header(&header(4, Tick::INVALID)));
        assert!(!peer.accept_header(&header(4, Tick::INVALID)));
        assert!(!peer.accept_header(&header(2, Tick::INVALID)));
        assert!(peer.accept_header(&header(6, Tick::INVALID)));
        assert_eq!(peer.newest_remote_tick(), Tick::new(6));
    }

    #[test]
    fn remote_ack_is_monotonic() {
        let mut peer = peer();
        peer.accept_header(&header(1, Tick::new(10)));
        peer.accept_header(&header(2, Tick::new(8)));
        assert_eq!(peer.last_acked_tick(), Tick::new(10));
    }

    #[test]
    fn clock_estimate_tracks_elapsed_updates() {
        let mut peer = peer();
        assert_eq!(peer.estimated_remote_tick(), Tick::INVALID);
        peer.accept_header(&header(10, Tick::INVALID));
        peer.advance_clock();
        peer.advance_clock();
        assert_eq!(peer.estimated_remote_tick(), Tick::new(12));
        peer.accept_header(&header(12, Tick::INVALID));
        assert_eq!(peer.estimated_remote_tick(), Tick::new(12));
    }

    #[test]
    fn header_reports_local_ack() {
        let mut peer = peer();
        assert_eq!(peer.header(Tick::new(1)).ack_tick, Tick::INVALID);
        peer.acknowledge(Tick::new(5));
        peer.acknowledge(Tick::new(3));
        let header = peer.header(Tick::new(2));
        assert_eq!(header.tick, Tick::new(2));
        assert_eq!(header.ack_tick, Tick::new(5));
        assert_eq!(header.ack_event_id, EventId::INVALID);
    }
}
