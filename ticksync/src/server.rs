//! Authoritative server connection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use codec::{
    payload_bits_budget, Attempts, ClientPacket, CodecError, EntityId, Event, EventId,
    PacketCodec, ServerPacket, Snapshot, SnapshotHistory, State, Tick,
};
use schema::{Registry, TypeKind};
use scope::{AlwaysInScope, Scope, ScopeEvaluator};
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::entity::{Entity, EntityLogic};
use crate::error::{Error, Result};
use crate::peer::{Peer, PeerId};
use crate::room::Room;
use crate::transport::Transport;

/// Server packets carry events, removals and deltas.
const SERVER_SECTIONS: usize = 3;
/// Bits per removal marker.
const REMOVAL_BITS: usize = 32;

/// Something the application should know about after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotification {
    PeerAdded(PeerId),
    PeerRemoved(PeerId),
    EventReceived { peer: PeerId, event: Event },
}

#[derive(Debug)]
struct ServerPeer {
    peer: Peer,
    scope: Scope,
}

/// Owns the authoritative [`Room`] and replicates it to every peer.
///
/// Drive it with [`update`](Self::update) once per simulation step.
#[derive(Debug)]
pub struct Server {
    codec: PacketCodec,
    config: SyncConfig,
    room: Room,
    history: SnapshotHistory,
    peers: BTreeMap<PeerId, ServerPeer>,
    next_peer: u32,
    notifications: Vec<ServerNotification>,
}

impl Server {
    /// Creates a server for `registry`.
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
            history: SnapshotHistory::new(config.history_capacity()),
            config,
            room: Room::new(),
            peers: BTreeMap::new(),
            next_peer: 1,
            notifications: Vec::new(),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        self.codec.registry()
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The tick of the last update.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.room.tick()
    }

    #[must_use]
    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn room_mut(&mut self) -> &mut Room {
        &mut self.room
    }

    /// Snapshots retained for delta baselines.
    #[must_use]
    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    /// A state of `kind` holding its layout's default values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStateKind`] if `kind` is not registered.
    pub fn create_state(&self, kind: TypeKind) -> Result<State> {
        self.registry()
            .state(kind)
            .map(State::new)
            .ok_or(Error::UnknownStateKind { kind })
    }

    /// Builds a detached entity; it joins the world on [`add_entity`](Self::add_entity).
    #[must_use]
    pub fn create_entity(&self, state: State, logic: impl EntityLogic + 'static) -> Entity {
        Entity::new(state, Box::new(logic))
    }

    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        self.room.add_entity(entity)
    }

    /// Schedules removal at the next tick. Returns `false` if the entity is
    /// unknown or already removing.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.room.remove_entity(entity)
    }

    /// Connects a peer that sees the whole world.
    pub fn add_peer(&mut self, transport: impl Transport + 'static) -> PeerId {
        self.add_peer_with_scope(transport, AlwaysInScope)
    }

    /// Connects a peer with its own interest policy.
    pub fn add_peer_with_scope(
        &mut self,
        transport: impl Transport + 'static,
        evaluator: impl ScopeEvaluator + 'static,
    ) -> PeerId {
        let id = PeerId::new(self.next_peer);
        self.next_peer += 1;
        let peer = Peer::new(Box::new(transport))
            .with_max_events(self.config.codec_limits.max_events)
            .with_max_event_bits(event_budget(&self.config));
        let scope = Scope::new(evaluator, self.config.history_capacity())
            .with_budget(self.config.scope_budget());
        self.peers.insert(id, ServerPeer { peer, scope });
        self.room.add_controller(id);
        info!(peer = %id, "peer added");
        self.notifications.push(ServerNotification::PeerAdded(id));
        id
    }

    /// Replaces a peer's interest policy. Returns `false` for an unknown peer.
    pub fn set_scope_evaluator(
        &mut self,
        peer: PeerId,
        evaluator: impl ScopeEvaluator + 'static,
    ) -> bool {
        match self.peers.get_mut(&peer) {
            Some(server_peer) => {
                server_peer.scope.set_evaluator(evaluator);
                true
            }
            None => false,
        }
    }

    /// Disconnects a peer and releases every entity it controlled.
    pub fn remove_peer(&mut self, peer: PeerId) -> bool {
        if self.peers.remove(&peer).is_none() {
            return false;
        }
        self.room.remove_controller(peer);
        info!(%peer, "peer removed");
        self.notifications.push(ServerNotification::PeerRemoved(peer));
        true
    }

    #[must_use]
    pub fn peer(&self, peer: PeerId) -> Option<&Peer> {
        self.peers.get(&peer).map(|server_peer| &server_peer.peer)
    }

    #[must_use]
    pub fn scope(&self, peer: PeerId) -> Option<&Scope> {
        self.peers.get(&peer).map(|server_peer| &server_peer.scope)
    }

    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.keys().copied()
    }

    /// Queues `event` for every peer. `None` uses the configured attempts.
    pub fn broadcast_event(&mut self, event: Event, attempts: Option<Attempts>) {
        let attempts = attempts.unwrap_or(self.config.default_attempts);
        for server_peer in self.peers.values_mut() {
            server_peer.peer.queue_event(event.clone(), attempts);
        }
    }

    /// Queues a reliable event for one peer. Returns the assigned id, or
    /// `None` for an unknown peer.
    pub fn queue_event(
        &mut self,
        peer: PeerId,
        event: Event,
        attempts: Option<Attempts>,
    ) -> Option<EventId> {
        let attempts = attempts.unwrap_or(self.config.default_attempts);
        self.peers
            .get_mut(&peer)
            .map(|server_peer| server_peer.peer.queue_event(event, attempts))
    }

    /// Sends an event once on the peer's next packet.
    pub fn send_unreliable(&mut self, peer: PeerId, event: Event) -> bool {
        match self.peers.get_mut(&peer) {
            Some(server_peer) => {
                server_peer.peer.send_unreliable(event);
                true
            }
            None => false,
        }
    }

    /// # Panics
    ///
    /// Panics if the peer or entity is unknown, the entity is pending removal
    /// or another peer controls it.
    pub fn grant_control(&mut self, peer: PeerId, entity: EntityId) {
        self.room.grant_control(peer, entity);
    }

    /// # Panics
    ///
    /// Panics if the peer or entity is unknown or the peer does not control
    /// the entity.
    pub fn revoke_control(&mut self, peer: PeerId, entity: EntityId) {
        self.room.revoke_control(peer, entity);
    }

    pub fn drain_notifications(&mut self) -> Vec<ServerNotification> {
        std::mem::take(&mut self.notifications)
    }

    /// Runs one simulation step.
    ///
    /// Inbound traffic is processed first, then the room advances, and on
    /// send ticks the world is snapshotted and every peer gets a packet.
    pub fn update(&mut self) {
        self.receive_all();

        let disconnected: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, server_peer)| !server_peer.peer.is_connected())
            .map(|(&id, _)| id)
            .collect();
        for peer in disconnected {
            self.remove_peer(peer);
        }

        let removed = self.room.update();
        for entity in removed {
            for server_peer in self.peers.values_mut() {
                server_peer.scope.remove_entity(entity);
            }
        }

        let tick = self.room.tick();
        if !tick.is_send_tick(self.config.server_send_rate) {
            return;
        }
        if let Err(err) = self.history.store(self.room.store_states()) {
            debug!(%tick, %err, "snapshot not stored");
            return;
        }
        self.send_all();
    }

    fn receive_all(&mut self) {
        let Self {
            codec,
            room,
            peers,
            notifications,
            ..
        } = self;
        for (&id, server_peer) in peers.iter_mut() {
            while let Some(bytes) = server_peer.peer.receive() {
                let packet = match codec.decode_client(&bytes) {
                    Ok(packet) => packet,
                    Err(err) => {
                        debug!(peer = %id, %err, "client packet dropped");
                        continue;
                    }
                };
                process_client_packet(id, server_peer, packet, room, notifications);
            }
        }
    }

    fn send_all(&mut self) {
        let Self {
            codec,
            config,
            room,
            history,
            peers,
            ..
        } = self;
        let Some(snapshot) = history.latest() else {
            return;
        };
        for (&id, server_peer) in peers.iter_mut() {
            let controlled = room.controlled_by(id);
            let sent = send_snapshot(codec, config, history, snapshot, server_peer, &controlled);
            if let Err(err) = sent {
                debug!(peer = %id, %err, "server packet not sent");
            }
        }
    }
}

fn process_client_packet(
    id: PeerId,
    server_peer: &mut ServerPeer,
    packet: ClientPacket,
    room: &mut Room,
    notifications: &mut Vec<ServerNotification>,
) {
    let header = packet.header;
    if !server_peer.peer.accept_header(&header) {
        return;
    }
    server_peer.scope.integrate_ack(header.ack_tick);
    server_peer.peer.acknowledge(header.tick);

    for event in server_peer.peer.receive_events(packet.events) {
        notifications.push(ServerNotification::EventReceived { peer: id, event });
    }
    for command in packet.commands {
        let entity = command.entity;
        if room.set_command(id, command) {
            trace!(peer = %id, %entity, "command stored");
        } else {
            warn!(peer = %id, %entity, "command for entity the peer does not control");
        }
    }
}

/// Payload bits reserved for events; the rest goes to removals and deltas.
fn event_budget(config: &SyncConfig) -> usize {
    payload_bits_budget(config.max_packet_bytes, SERVER_SECTIONS) / 2
}

/// Builds, encodes and sends the packet for one peer.
fn send_snapshot(
    codec: &PacketCodec,
    config: &SyncConfig,
    history: &SnapshotHistory,
    snapshot: &Snapshot,
    server_peer: &mut ServerPeer,
    controlled: &BTreeSet<EntityId>,
) -> Result<()> {
    let tick = snapshot.tick();
    let registry = codec.registry();
    let budget = payload_bits_budget(config.max_packet_bytes, SERVER_SECTIONS);

    let mut packet = ServerPacket::new(server_peer.peer.header(tick));
    packet.events = server_peer
        .peer
        .pack_events(tick, event_budget(config), registry);
    let mut used = packet
        .events
        .iter()
        .map(|event| event.cost_bits(registry))
        .sum::<codec::CodecResult<usize>>()?;

    let selected = server_peer.scope.evaluate(tick, snapshot, controlled);

    for entity in server_peer.scope.removals() {
        if used + REMOVAL_BITS > budget {
            break;
        }
        used += REMOVAL_BITS;
        packet.removals.push(entity);
    }

    let scope = &server_peer.scope;
    let deltas =
        history.create_delta_with(snapshot, &selected, |entity| scope.baseline_for(entity));
    for mut delta in deltas {
        delta.controlled = controlled.contains(&delta.entity);
        let cost = match delta.cost_bits(registry) {
            Ok(cost) => cost,
            Err(err) => {
                debug!(entity = %delta.entity, %err, "delta cannot be encoded");
                continue;
            }
        };
        if used + cost > budget {
            trace!(entity = %delta.entity, cost, "delta deferred, packet full");
            continue;
        }
        used += cost;
        packet.deltas.push(delta);
    }

    let sent: Vec<EntityId> = packet.deltas.iter().map(|delta| delta.entity).collect();
    server_peer
        .scope
        .record_sent(tick, &sent, &packet.removals)
        .map_err(CodecError::from)?;

    let bytes = codec.encode_server(&packet)?;
    server_peer.peer.send(&bytes)?;
    Ok(())
}
