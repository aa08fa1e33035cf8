//! Binding between a remote peer and the entities it controls.

use std::collections::{BTreeMap, BTreeSet};

use codec::EntityId;
use tracing::debug;

use crate::entity::Entity;
use crate::peer::PeerId;

/// The set of entities one peer controls.
///
/// Ownership is exclusive: an entity is in a controller's set exactly when
/// its back-reference names that controller's peer. Every mutation goes
/// through the entity table so both sides change together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    peer: PeerId,
    controlled: BTreeSet<EntityId>,
}

impl Controller {
    /// Creates an empty controller for `peer`.
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            controlled: BTreeSet::new(),
        }
    }

    /// The peer this controller acts for.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Entities under this controller, in id order.
    pub fn controlled(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.controlled.iter().copied()
    }

    /// Returns `true` if `entity` is in this controller's set.
    #[must_use]
    pub fn controls(&self, entity: EntityId) -> bool {
        self.controlled.contains(&entity)
    }

    /// Number of controlled entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.controlled.len()
    }

    /// Returns `true` if the peer controls nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controlled.is_empty()
    }

    pub(crate) fn controlled_set(&self) -> &BTreeSet<EntityId> {
        &self.controlled
    }

    /// Takes control of `entity`.
    ///
    /// # Panics
    ///
    /// Panics if the entity is pending removal or controlled by another
    /// peer. Granting to the current controller is a no-op.
    pub fn grant(&mut self, entity: &mut Entity) {
        assert!(
            !entity.is_removing(),
            "cannot grant control of entity {} pending removal",
            entity.id
        );
        match entity.controller {
            Some(owner) if owner == self.peer => return,
            Some(owner) => panic!(
                "entity {} is already controlled by peer {owner}, cannot grant to {}",
                entity.id, self.peer
            ),
            None => {}
        }
        entity.controller = Some(self.peer);
        self.controlled.insert(entity.id);
        debug!(entity = %entity.id, peer = %self.peer, "control granted");
    }

    /// Gives up control of `entity`.
    ///
    /// # Panics
    ///
    /// Panics if this controller does not own the entity.
    pub fn revoke(&mut self, entity: &mut Entity) {
        assert!(
            entity.controller == Some(self.peer) && self.controlled.contains(&entity.id),
            "peer {} does not control entity {}",
            self.peer,
            entity.id
        );
        entity.controller = None;
        entity.command = None;
        self.controlled.remove(&entity.id);
        debug!(entity = %entity.id, peer = %self.peer, "control revoked");
    }

    /// Revokes every owned entity and clears the set.
    pub fn shutdown(&mut self, entities: &mut BTreeMap<EntityId, Entity>) {
        for id in std::mem::take(&mut self.controlled) {
            if let Some(entity) = entities.get_mut(&id) {
                entity.controller = None;
                entity.command = None;
            }
        }
        debug!(peer = %self.peer, "controller shut down");
    }
}
