//! Client connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use codec::{
    payload_bits_budget, Attempts, ClientPacket, Command, EntityId, Event, EventId, PacketCodec,
    ServerPacket, Tick,
};
use schema::{FieldValue, Registry};
use tracing::{debug, info, trace};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::room::ClientRoom;
use crate::transport::Transport;

/// Client packets carry events and commands.
const CLIENT_SECTIONS: usize = 2;

/// Something the application should know about after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotification {
    EventReceived(Event),
    EntityAdded(EntityId),
    EntityRemoved(EntityId),
    /// The server transport went away; the peer has been cleared.
    Disconnected,
}

/// Replicates a server room and sends local input back.
///
/// Call [`start_room`](Self::start_room) and [`set_peer`](Self::set_peer),
/// then [`update`](Self::update) once per local step.
#[derive(Debug)]
pub struct Client {
    codec: PacketCodec,
    config: SyncConfig,
    peer: Option<Peer>,
    room: Option<ClientRoom>,
    local_tick: Tick,
    commands: BTreeMap<EntityId, Vec<FieldValue>>,
    notifications: Vec<ClientNotification>,
}

impl Client {
    /// Creates a client for `registry`, which must match the server's.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the registry is invalid.
    pub fn new(registry: Arc<Registry>, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let codec = PacketCodec::new(registry)?
            .with_limits(config.wire_limits(), config.codec_limits.clone());
        Ok(Self {
            codec,
            config,
            peer: None,
            room: None,
            local_tick: Tick::START,
            commands: BTreeMap::new(),
            notifications: Vec::new(),
        })
    }

    /// Creates the room that server deltas are applied to.
    ///
    /// Deltas arriving before this are dropped and not acknowledged.
    pub fn start_room(&mut self) {
        self.room = Some(ClientRoom::new(self.config.history_capacity()));
    }

    /// Connects to the server.
    ///
    /// # Panics
    ///
    /// Panics if a peer is already set; call [`clear_peer`](Self::clear_peer) first.
    pub fn set_peer(&mut self, transport: impl Transport + 'static) {
        assert!(
            self.peer.is_none(),
            "overwriting an active server peer, clear it first"
        );
        self.peer = Some(
            Peer::new(Box::new(transport))
                .with_max_events(self.config.codec_limits.max_events)
                .with_max_event_bits(payload_bits_budget(
                    self.config.max_packet_bytes,
                    CLIENT_SECTIONS,
                )),
        );
        info!("server peer set");
    }

    pub fn clear_peer(&mut self) {
        if self.peer.take().is_some() {
            info!("server peer cleared");
        }
    }

    #[must_use]
    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    #[must_use]
    pub fn room(&self) -> Option<&ClientRoom> {
        self.room.as_ref()
    }

    /// The next local tick to run.
    #[must_use]
    pub fn local_tick(&self) -> Tick {
        self.local_tick
    }

    /// Queues a reliable event for the server. `None` uses the configured
    /// attempts.
    ///
    /// # Panics
    ///
    /// Panics if no server peer is set.
    pub fn queue_event(&mut self, event: Event, attempts: Option<Attempts>) -> EventId {
        let attempts = attempts.unwrap_or(self.config.default_attempts);
        self.peer
            .as_mut()
            .unwrap_or_else(|| panic!("queue_event without a server peer"))
            .queue_event(event, attempts)
    }

    /// Sends an event once with the next packet.
    ///
    /// # Panics
    ///
    /// Panics if no server peer is set.
    pub fn send_unreliable(&mut self, event: Event) {
        self.peer
            .as_mut()
            .unwrap_or_else(|| panic!("send_unreliable without a server peer"))
            .send_unreliable(event);
    }

    /// Sets the input sent for `entity` on every send tick while the client
    /// controls it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommand`] if the registry has no command
    /// layout or `fields` does not match it.
    pub fn set_command(&mut self, entity: EntityId, fields: Vec<FieldValue>) -> Result<()> {
        let accepted = self
            .codec
            .registry()
            .command()
            .is_some_and(|def| def.accepts(&fields));
        if !accepted {
            return Err(Error::InvalidCommand);
        }
        self.commands.insert(entity, fields);
        Ok(())
    }

    pub fn drain_notifications(&mut self) -> Vec<ClientNotification> {
        std::mem::take(&mut self.notifications)
    }

    /// Runs one local step.
    ///
    /// Without a peer this does nothing. Otherwise inbound packets are
    /// applied, the room clock follows the server estimate, and on local
    /// send ticks a packet with events and commands goes out.
    pub fn update(&mut self) {
        let Self {
            codec,
            config,
            peer: peer_slot,
            room,
            local_tick,
            commands,
            notifications,
        } = self;
        let Some(peer) = peer_slot.as_mut() else {
            return;
        };

        peer.advance_clock();
        while let Some(bytes) = peer.receive() {
            match codec.decode_server(&bytes) {
                Ok(packet) => {
                    process_server_packet(peer, room.as_mut(), packet, commands, notifications);
                }
                Err(err) => debug!(%err, "server packet dropped"),
            }
        }
        if !peer.is_connected() {
            info!("server disconnected");
            *peer_slot = None;
            notifications.push(ClientNotification::Disconnected);
            return;
        }

        let Some(room) = room.as_mut() else {
            return;
        };
        room.set_tick(peer.estimated_remote_tick());

        if local_tick.is_send_tick(config.client_send_rate) {
            let packet = build_packet(codec, config, peer, room, commands, *local_tick);
            let sent = codec
                .encode_client(&packet)
                .map_err(Error::from)
                .and_then(|bytes| peer.send(&bytes).map_err(Error::from));
            if let Err(err) = sent {
                debug!(tick = %local_tick, %err, "client packet not sent");
            }
        }
        *local_tick = local_tick.next();
    }
}

fn process_server_packet(
    peer: &mut Peer,
    room: Option<&mut ClientRoom>,
    packet: ServerPacket,
    commands: &mut BTreeMap<EntityId, Vec<FieldValue>>,
    notifications: &mut Vec<ClientNotification>,
) {
    let header = packet.header;
    if !peer.accept_header(&header) {
        return;
    }
    for event in peer.receive_events(packet.events) {
        notifications.push(ClientNotification::EventReceived(event));
    }

    let Some(room) = room else {
        debug!(tick = %header.tick, deltas = packet.deltas.len(), "no room, deltas dropped");
        return;
    };

    for entity in packet.removals {
        if room.remove_entity(entity) {
            commands.remove(&entity);
            notifications.push(ClientNotification::EntityRemoved(entity));
        }
    }

    let mut complete = true;
    for delta in &packet.deltas {
        match room.process_delta(delta, header.tick) {
            Ok(true) => notifications.push(ClientNotification::EntityAdded(delta.entity)),
            Ok(false) => {}
            Err(err) => {
                debug!(entity = %delta.entity, tick = %header.tick, %err, "delta dropped");
                complete = false;
            }
        }
    }
    // A partially applied packet is not acknowledged, so the server keeps
    // diffing against baselines this client still holds.
    if complete {
        peer.acknowledge(header.tick);
    } else {
        trace!(tick = %header.tick, "packet not acknowledged");
    }
}

fn build_packet(
    codec: &PacketCodec,
    config: &SyncConfig,
    peer: &mut Peer,
    room: &ClientRoom,
    commands: &BTreeMap<EntityId, Vec<FieldValue>>,
    tick: Tick,
) -> ClientPacket {
    let mut packet = ClientPacket::new(peer.header(tick));
    let mut budget = payload_bits_budget(config.max_packet_bytes, CLIENT_SECTIONS);

    if let Ok(command_bits) = codec.command_bits() {
        for entity in room.controlled_entities() {
            let Some(fields) = commands.get(&entity) else {
                continue;
            };
            if packet.commands.len() == codec.limits().max_commands || command_bits > budget {
                break;
            }
            budget -= command_bits;
            packet.commands.push(Command {
                entity,
                tick,
                fields: fields.clone(),
            });
        }
    }

    packet.events = peer.pack_events(tick, budget, codec.registry());
    packet
}
