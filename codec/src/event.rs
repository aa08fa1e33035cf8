//! Reliable and unreliable events.

use std::collections::VecDeque;

use bitstream::{BitReader, BitWriter, IntEncoder};
use schema::{FieldValue, Registry, TypeDef, TypeKind};
use tracing::{debug, trace};

use crate::error::{CodecError, CodecResult};
use crate::field::{index_encoder, read_values, values_bits, write_values};
use crate::{EventId, Tick};

/// How many ticks a reliable event remembers having been sent on.
const MAX_SENT_TICKS: usize = 64;

/// An application message carried next to the state stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: TypeKind,
    /// Assigned by the sender; [`EventId::UNRELIABLE`] until queued reliably.
    pub id: EventId,
    pub fields: Vec<FieldValue>,
}

impl Event {
    /// Creates an unsequenced event.
    #[must_use]
    pub fn new(kind: TypeKind, fields: Vec<FieldValue>) -> Self {
        Self {
            kind,
            id: EventId::UNRELIABLE,
            fields,
        }
    }

    /// Returns `true` if this event was sequenced by a reliable sender.
    #[must_use]
    pub fn is_reliable(&self) -> bool {
        self.id.is_reliable()
    }

    /// Exact number of bits [`encode`](Self::encode) writes for this event.
    pub fn cost_bits(&self, registry: &Registry) -> CodecResult<usize> {
        let def = event_def(registry, self.kind)?;
        let id_bits = if self.is_reliable() {
            id_encoder().bits() as usize
        } else {
            0
        };
        Ok(1 + id_bits + kind_encoder(registry).bits() as usize + values_bits(def))
    }

    /// Writes this event to `writer`.
    pub fn encode(&self, writer: &mut BitWriter, registry: &Registry) -> CodecResult<()> {
        let def = event_def(registry, self.kind)?;
        let kind_index = registry
            .event_index(self.kind)
            .ok_or(CodecError::UnknownKind { kind: self.kind })?;

        writer.write_bool(self.is_reliable());
        if self.is_reliable() {
            id_encoder().write(writer, i64::from(self.id.raw()))?;
        }
        kind_encoder(registry).write(writer, kind_index as i64)?;
        write_values(writer, def, &self.fields)
    }

    /// Reads an event from `reader`.
    pub fn decode(reader: &mut BitReader<'_>, registry: &Registry) -> CodecResult<Self> {
        let reliable = reader.read_bool()?;
        let id = if reliable {
            EventId::new(id_encoder().read(reader)? as i32)
        } else {
            EventId::UNRELIABLE
        };
        let kind_index = kind_encoder(registry).read(reader)? as usize;
        let def = registry
            .events
            .get(kind_index)
            .ok_or(bitstream::BitError::OutsideRange {
                value: kind_index as i128,
                min: 0,
                max: 0,
            })?;
        let fields = read_values(reader, def)?;
        Ok(Self {
            kind: def.kind,
            id,
            fields,
        })
    }
}

/// Retry budget of a reliable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Attempts {
    /// Sent on at most this many send ticks.
    Limited(u32),
    /// Retried until acknowledged.
    Forever,
}

impl Default for Attempts {
    fn default() -> Self {
        Self::Limited(3)
    }
}

impl Attempts {
    fn exhausted(self, used: u32) -> bool {
        match self {
            Self::Limited(limit) => used >= limit,
            Self::Forever => false,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingEvent {
    event: Event,
    attempts: Attempts,
    used: u32,
    sent_ticks: VecDeque<Tick>,
}

/// Outbound half of the event layer for one peer.
///
/// Reliable events keep their ids in queue order and are retransmitted on
/// every packed tick until acknowledged or out of attempts. Unreliable events
/// go out at most once.
#[derive(Debug, Clone)]
pub struct EventSender {
    next_id: EventId,
    pending: VecDeque<PendingEvent>,
    unreliable: Vec<Event>,
    max_per_packet: usize,
    max_event_bits: usize,
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSender {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: EventId::FIRST,
            pending: VecDeque::new(),
            unreliable: Vec::new(),
            max_per_packet: usize::MAX,
            max_event_bits: usize::MAX,
        }
    }

    /// Caps how many events one packet may carry, to match the receiver's
    /// decode limits.
    #[must_use]
    pub fn with_max_per_packet(mut self, max: usize) -> Self {
        self.max_per_packet = max;
        self
    }

    /// Largest reliable event, in encoded bits, that any packet could carry.
    ///
    /// Bigger events are dropped by [`pack`](Self::pack) instead of waiting
    /// at the head of the queue forever.
    #[must_use]
    pub fn with_max_event_bits(mut self, bits: usize) -> Self {
        self.max_event_bits = bits;
        self
    }

    /// Assigns the next reliable id to `event` and queues it.
    pub fn queue(&mut self, mut event: Event, attempts: Attempts) -> EventId {
        let id = self.next_id;
        self.next_id = id.next();
        event.id = id;
        self.pending.push_back(PendingEvent {
            event,
            attempts,
            used: 0,
            sent_ticks: VecDeque::new(),
        });
        id
    }

    /// Queues an event for a single best-effort transmission.
    pub fn send_unreliable(&mut self, mut event: Event) {
        event.id = EventId::UNRELIABLE;
        self.unreliable.push(event);
    }

    /// Number of reliable events awaiting acknowledgment.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.unreliable.is_empty()
    }

    /// Selects the events for the packet sent at `tick`.
    ///
    /// Reliable events form a contiguous prefix of the pending queue in
    /// ascending id order, followed by as many unreliable events as still
    /// fit. The unreliable queue is always drained.
    ///
    /// A reliable event over the [`with_max_event_bits`](Self::with_max_event_bits)
    /// ceiling is dropped so the events queued behind it still go out. One
    /// that only misses this call's `budget_bits` waits for a later packet.
    pub fn pack(&mut self, tick: Tick, budget_bits: usize, registry: &Registry) -> Vec<Event> {
        self.pending.retain(|pending| {
            let keep = !pending.attempts.exhausted(pending.used);
            if !keep {
                trace!(id = %pending.event.id, attempts = pending.used, "reliable event exhausted");
            }
            keep
        });

        let mut out = Vec::new();
        let mut used_bits = 0usize;
        let mut rejected = Vec::new();

        for (index, pending) in self.pending.iter_mut().enumerate() {
            let cost = match pending.event.cost_bits(registry) {
                Ok(cost) => cost,
                Err(err) => {
                    trace!(id = %pending.event.id, %err, "reliable event cannot be encoded");
                    rejected.push(index);
                    continue;
                }
            };
            if cost > self.max_event_bits {
                debug!(
                    id = %pending.event.id,
                    cost,
                    max = self.max_event_bits,
                    "reliable event can never fit a packet"
                );
                rejected.push(index);
                continue;
            }
            if used_bits + cost > budget_bits || out.len() == self.max_per_packet {
                break;
            }
            used_bits += cost;
            pending.used += 1;
            if pending.sent_ticks.len() == MAX_SENT_TICKS {
                pending.sent_ticks.pop_front();
            }
            pending.sent_ticks.push_back(tick);
            out.push(pending.event.clone());
        }
        for index in rejected.into_iter().rev() {
            self.pending.remove(index);
        }

        for event in self.unreliable.drain(..) {
            match event.cost_bits(registry) {
                Ok(cost) if used_bits + cost <= budget_bits && out.len() < self.max_per_packet => {
                    used_bits += cost;
                    out.push(event);
                }
                Ok(_) => trace!(kind = event.kind.get(), "unreliable event dropped"),
                Err(err) => trace!(kind = event.kind.get(), %err, "unreliable event cannot be encoded"),
            }
        }
        out
    }

    /// Prunes reliable events the remote has seen.
    ///
    /// An event is done when it rode the packet of `ack_tick`, or when its
    /// id is not newer than the remote's highest processed id. A later tick
    /// alone proves nothing: the event budget can shrink and leave a pending
    /// event out of the acked packet.
    pub fn integrate_ack(&mut self, ack_tick: Tick, ack_event_id: EventId) {
        self.pending.retain(|pending| {
            let by_tick = ack_tick.is_valid() && pending.sent_ticks.contains(&ack_tick);
            let by_id = ack_event_id.is_reliable() && !pending.event.id.is_newer_than(ack_event_id);
            if by_tick || by_id {
                trace!(id = %pending.event.id, "reliable event acknowledged");
            }
            !(by_tick || by_id)
        });
    }
}

/// Inbound half of the event layer for one peer.
#[derive(Debug, Clone)]
pub struct EventReceiver {
    last_processed: EventId,
}

impl Default for EventReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl EventReceiver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_processed: EventId::INVALID,
        }
    }

    /// Highest reliable id processed so far, or [`EventId::INVALID`].
    #[must_use]
    pub fn last_processed(&self) -> EventId {
        self.last_processed
    }

    /// Returns `true` if `event` should be delivered to the application.
    ///
    /// Unreliable events always pass. A reliable event passes only if it is
    /// newer than every reliable event processed before it.
    pub fn accept(&mut self, event: &Event) -> bool {
        if !event.is_reliable() {
            return true;
        }
        if self.last_processed.is_reliable() && !event.id.is_newer_than(self.last_processed) {
            trace!(id = %event.id, last = %self.last_processed, "duplicate reliable event");
            return false;
        }
        self.last_processed = event.id;
        true
    }

    /// Filters a packet's events down to the ones to deliver, in order.
    pub fn receive(&mut self, events: Vec<Event>) -> Vec<Event> {
        events.into_iter().filter(|event| self.accept(event)).collect()
    }
}

fn event_def(registry: &Registry, kind: TypeKind) -> CodecResult<&TypeDef> {
    registry.event(kind).ok_or(CodecError::UnknownKind { kind })
}

fn kind_encoder(registry: &Registry) -> IntEncoder {
    index_encoder(registry.events.len())
}

fn id_encoder() -> IntEncoder {
    IntEncoder::new(
        i64::from(EventId::FIRST.raw()),
        i64::from(EventId::MAX.raw()),
    )
}
