//! Server and client rooms.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use codec::{CodecError, CodecResult, EntityId, Snapshot, State, StateDelta, Tick, TickRing};
use schema::TypeKind;
use tracing::{debug, trace};

use crate::controller::Controller;
use crate::entity::Entity;
use crate::peer::PeerId;

/// Game code called by the [`Room`] as it runs.
///
/// Every method defaults to doing nothing.
pub trait RoomHooks: Send {
    /// The tick has advanced and no entity has run yet.
    fn pre_update(&mut self, _tick: Tick) {}

    /// Every entity has run for `tick` and `removed` are gone.
    fn post_update(&mut self, _tick: Tick, _removed: &[EntityId]) {}

    fn controller_joined(&mut self, _peer: PeerId) {}

    /// Called after the peer's entities were released.
    fn controller_left(&mut self, _peer: PeerId) {}
}

/// The authoritative simulation: entity table, tick and controllers.
///
/// Entities move from active to pending removal (a removal tick is set) to
/// removed (dropped by the update that reaches that tick).
pub struct Room {
    tick: Tick,
    next_id: EntityId,
    entities: BTreeMap<EntityId, Entity>,
    controllers: BTreeMap<PeerId, Controller>,
    hooks: Option<Box<dyn RoomHooks>>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("tick", &self.tick)
            .field("next_id", &self.next_id)
            .field("entities", &self.entities)
            .field("controllers", &self.controllers)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

impl Room {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick: Tick::INVALID,
            next_id: EntityId::FIRST,
            entities: BTreeMap::new(),
            controllers: BTreeMap::new(),
            hooks: None,
        }
    }

    /// Installs the callbacks run around each update and on controller
    /// changes, replacing any previous ones.
    pub fn set_hooks(&mut self, hooks: impl RoomHooks + 'static) {
        self.hooks = Some(Box::new(hooks));
    }

    /// The tick of the last update, or [`Tick::INVALID`] before the first.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// The tick the next update will run.
    #[must_use]
    pub fn upcoming_tick(&self) -> Tick {
        if self.tick.is_valid() {
            self.tick.next()
        } else {
            Tick::START
        }
    }

    /// Adds a detached entity and assigns its id.
    ///
    /// # Panics
    ///
    /// Panics if the entity already belongs to a room.
    pub fn add_entity(&mut self, mut entity: Entity) -> EntityId {
        assert!(
            !entity.id.is_valid(),
            "entity {} was already added to a room",
            entity.id
        );
        let id = self.next_id;
        self.next_id = id.next();
        entity.id = id;
        self.entities.insert(id, entity);
        debug!(entity = %id, tick = %self.tick, "entity added");
        id
    }

    /// Schedules `id` for removal on the next update and revokes its control
    /// immediately. Returns `false` if the entity is unknown or already
    /// removing.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let removal_tick = self.upcoming_tick();
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        if entity.is_removing() {
            return false;
        }
        if let Some(peer) = entity.controller {
            if let Some(controller) = self.controllers.get_mut(&peer) {
                controller.revoke(entity);
            }
        }
        entity.removed_at = removal_tick;
        debug!(entity = %id, at = %removal_tick, "entity removal scheduled");
        true
    }

    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// All entities, pending removals included, in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Advances one tick and runs every entity between the pre and post
    /// update hooks.
    ///
    /// Entities whose removal tick has been reached are collected first and
    /// skip their update; the batch is dropped after every other entity ran.
    /// Returns the removed ids.
    pub fn update(&mut self) -> Vec<EntityId> {
        self.tick = self.upcoming_tick();
        let tick = self.tick;
        if let Some(hooks) = &mut self.hooks {
            hooks.pre_update(tick);
        }

        let mut removed = Vec::new();
        for (&id, entity) in &mut self.entities {
            if entity.removed_at.is_valid() && entity.removed_at <= tick {
                removed.push(id);
            } else {
                entity.update(tick);
            }
        }

        for id in &removed {
            self.entities.remove(id);
            trace!(entity = %id, %tick, "entity removed");
        }
        if let Some(hooks) = &mut self.hooks {
            hooks.post_update(tick, &removed);
        }
        removed
    }

    /// Snapshot of every entity in the room at the current tick.
    #[must_use]
    pub fn store_states(&self) -> Snapshot {
        let mut snapshot = Snapshot::new(self.tick);
        for (&id, entity) in &self.entities {
            snapshot.insert(id, entity.state.clone());
        }
        snapshot
    }

    pub(crate) fn add_controller(&mut self, peer: PeerId) {
        if self.controllers.contains_key(&peer) {
            return;
        }
        self.controllers.insert(peer, Controller::new(peer));
        if let Some(hooks) = &mut self.hooks {
            hooks.controller_joined(peer);
        }
    }

    /// Drops `peer`'s controller after revoking all of its entities.
    pub(crate) fn remove_controller(&mut self, peer: PeerId) {
        if let Some(mut controller) = self.controllers.remove(&peer) {
            controller.shutdown(&mut self.entities);
            if let Some(hooks) = &mut self.hooks {
                hooks.controller_left(peer);
            }
        }
    }

    #[must_use]
    pub fn controller(&self, peer: PeerId) -> Option<&Controller> {
        self.controllers.get(&peer)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.controllers.values()
    }

    pub(crate) fn controlled_by(&self, peer: PeerId) -> BTreeSet<EntityId> {
        self.controllers
            .get(&peer)
            .map(|controller| controller.controlled_set().clone())
            .unwrap_or_default()
    }

    /// # Panics
    ///
    /// Panics if the peer has no controller, the entity is unknown or the
    /// grant violates exclusive ownership.
    pub(crate) fn grant_control(&mut self, peer: PeerId, id: EntityId) {
        let controller = self
            .controllers
            .get_mut(&peer)
            .unwrap_or_else(|| panic!("peer {peer} has no controller"));
        let entity = self
            .entities
            .get_mut(&id)
            .unwrap_or_else(|| panic!("entity {id} is not in the room"));
        controller.grant(entity);
    }

    /// # Panics
    ///
    /// Panics if the peer has no controller, the entity is unknown or not
    /// controlled by the peer.
    pub(crate) fn revoke_control(&mut self, peer: PeerId, id: EntityId) {
        let controller = self
            .controllers
            .get_mut(&peer)
            .unwrap_or_else(|| panic!("peer {peer} has no controller"));
        let entity = self
            .entities
            .get_mut(&id)
            .unwrap_or_else(|| panic!("entity {id} is not in the room"));
        controller.revoke(entity);
    }

    /// Stores `command` as the newest input for its entity if `peer`
    /// controls it. Returns `false` when the command is not authorized.
    pub(crate) fn set_command(&mut self, peer: PeerId, command: codec::Command) -> bool {
        match self.entities.get_mut(&command.entity) {
            Some(entity) if entity.controller == Some(peer) => {
                let newer = entity
                    .command
                    .as_ref()
                    .map_or(true, |current| command.tick >= current.tick);
                if newer {
                    entity.command = Some(command);
                }
                true
            }
            _ => false,
        }
    }
}

/// An entity as the client sees it.
#[derive(Debug, Clone)]
pub struct RemoteEntity {
    kind: TypeKind,
    state: State,
    history: TickRing<State>,
    controlled: bool,
}

impl RemoteEntity {
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// The newest reconstructed state.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The state received for the server tick `tick`, while still retained.
    #[must_use]
    pub fn state_at(&self, tick: Tick) -> Option<&State> {
        self.history.get(tick)
    }

    /// Returns `true` if the local client controls this entity.
    #[must_use]
    pub fn is_controlled(&self) -> bool {
        self.controlled
    }
}

/// The client's replica of the server room.
#[derive(Debug)]
pub struct ClientRoom {
    tick: Tick,
    history_len: NonZeroUsize,
    entities: BTreeMap<EntityId, RemoteEntity>,
}

impl ClientRoom {
    #[must_use]
    pub fn new(history_len: NonZeroUsize) -> Self {
        Self {
            tick: Tick::INVALID,
            history_len,
            entities: BTreeMap::new(),
        }
    }

    /// The estimated server tick.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub(crate) fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&RemoteEntity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &RemoteEntity)> {
        self.entities.iter().map(|(&id, entity)| (id, entity))
    }

    /// Entities the local client controls, in id order.
    pub fn controlled_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .filter(|(_, entity)| entity.controlled)
            .map(|(&id, _)| id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Applies one delta from the server packet of `packet_tick`.
    ///
    /// Returns `true` if the entity is new to this room.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BaselineNotFound`] if the baseline state is not
    /// retained, and the errors of [`StateDelta::apply`].
    pub fn process_delta(&mut self, delta: &StateDelta, packet_tick: Tick) -> CodecResult<bool> {
        let existing = self.entities.get(&delta.entity);
        let state = match delta.baseline {
            None => delta.apply(None)?,
            Some(baseline) => {
                let base = existing
                    .and_then(|entity| entity.history.get(baseline))
                    .ok_or(CodecError::BaselineNotFound {
                        entity: delta.entity,
                        tick: baseline,
                    })?;
                delta.apply(Some(base))?
            }
        };

        let added = match self.entities.get_mut(&delta.entity) {
            Some(entity) if entity.kind == delta.kind => {
                entity.history.insert(packet_tick, state.clone())?;
                entity.state = state;
                entity.controlled = delta.controlled;
                false
            }
            _ => {
                let mut history = TickRing::new(self.history_len);
                history.insert(packet_tick, state.clone())?;
                self.entities.insert(
                    delta.entity,
                    RemoteEntity {
                        kind: delta.kind,
                        state,
                        history,
                        controlled: delta.controlled,
                    },
                );
                trace!(entity = %delta.entity, tick = %packet_tick, "remote entity added");
                true
            }
        };
        Ok(added)
    }

    /// Drops a remote entity. Returns `false` if it was not known.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }
}
