//! Server-side entities.

use codec::{Command, EntityId, State, Tick};

use crate::peer::PeerId;

/// Per-tick simulation behavior attached to an entity.
pub trait EntityLogic: Send {
    /// Advances `state` by one tick, given the newest command received for
    /// the entity (if it is controlled and one has arrived).
    fn update(&mut self, tick: Tick, state: &mut State, command: Option<&Command>);
}

impl<F> EntityLogic for F
where
    F: FnMut(Tick, &mut State, Option<&Command>) + Send,
{
    fn update(&mut self, tick: Tick, state: &mut State, command: Option<&Command>) {
        self(tick, state, command);
    }
}

/// Logic that never changes the state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inert;

impl EntityLogic for Inert {
    fn update(&mut self, _tick: Tick, _state: &mut State, _command: Option<&Command>) {}
}

/// A simulated object owned by the server room.
///
/// Created detached through [`Server::create_entity`](crate::Server::create_entity);
/// the room assigns its id on [`Server::add_entity`](crate::Server::add_entity).
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) state: State,
    pub(crate) logic: Box<dyn EntityLogic>,
    pub(crate) controller: Option<PeerId>,
    pub(crate) removed_at: Tick,
    pub(crate) command: Option<Command>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("controller", &self.controller)
            .field("removed_at", &self.removed_at)
            .finish_non_exhaustive()
    }
}

impl Entity {
    pub(crate) fn new(state: State, logic: Box<dyn EntityLogic>) -> Self {
        Self {
            id: EntityId::INVALID,
            state,
            logic,
            controller: None,
            removed_at: Tick::INVALID,
            command: None,
        }
    }

    /// The room-assigned id, or [`EntityId::INVALID`] while detached.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Live state, for game code running outside the entity's logic.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// The peer currently controlling this entity.
    #[must_use]
    pub fn controller(&self) -> Option<PeerId> {
        self.controller
    }

    /// Returns `true` once a removal tick has been scheduled.
    #[must_use]
    pub fn is_removing(&self) -> bool {
        self.removed_at.is_valid()
    }

    /// The tick at which the room drops this entity, or [`Tick::INVALID`].
    #[must_use]
    pub fn removed_at(&self) -> Tick {
        self.removed_at
    }

    /// The newest command accepted for this entity.
    #[must_use]
    pub fn command(&self) -> Option<&Command> {
        self.command.as_ref()
    }

    pub(crate) fn update(&mut self, tick: Tick) {
        self.logic.update(tick, &mut self.state, self.command.as_ref());
    }
}
