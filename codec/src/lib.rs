//! Tick history, delta compression, events and packets for ticksync.
//!
//! This crate ties together bitstream, wire and schema:
//!
//! - [`Tick`], [`EntityId`] and [`EventId`] with their wrap policies
//! - [`State`] and per-tick [`Snapshot`]s
//! - [`SnapshotHistory`] over a generic [`TickRing`]
//! - Per-entity [`StateDelta`]s with exact bit costs
//! - The reliable/unreliable event layer ([`EventSender`], [`EventReceiver`])
//! - [`ServerPacket`] / [`ClientPacket`] encoding through a [`PacketCodec`]
//!
//! # Design Principles
//!
//! - **Correctness first** - Applying a delta to its exact baseline reproduces the target.
//! - **Deterministic** - Same inputs produce same outputs.
//! - **Bounded** - History, sent-tick sets and decode counts are all capped.

mod delta;
mod error;
mod event;
mod field;
mod history;
mod limits;
mod packet;
mod state;
mod types;

pub use delta::StateDelta;
pub use error::{CodecError, CodecResult, HistoryError, LimitKind};
pub use event::{Attempts, Event, EventReceiver, EventSender};
pub use field::{value_bits, values_bits};
pub use history::{SnapshotHistory, TickRing};
pub use limits::CodecLimits;
pub use packet::{
    payload_bits_budget, ClientPacket, Command, PacketCodec, PacketHeader, ServerPacket,
};
pub use state::{Snapshot, State};
pub use types::{EntityId, EventId, Tick};
pub use wire::Limits as WireLimits;
