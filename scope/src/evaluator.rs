//! Scope evaluators: which entities a peer sees, and how urgently.

use std::collections::BTreeSet;

use codec::{EntityId, Snapshot, State, Tick};

use crate::Vec3;

/// What an evaluator may look at besides the entity itself.
#[derive(Debug, Clone, Copy)]
pub struct ScopeContext<'a> {
    /// The send tick being evaluated.
    pub tick: Tick,
    /// The world at `tick`.
    pub snapshot: &'a Snapshot,
    /// Entities controlled by the peer.
    pub controlled: &'a BTreeSet<EntityId>,
}

/// Decides whether an entity is in a peer's scope.
///
/// Returns a priority (higher is sent first) or `None` when the entity is
/// out of scope. `ticks_since_send` is `None` for entities never sent to
/// this peer.
pub trait ScopeEvaluator: Send {
    fn evaluate(
        &self,
        ctx: &ScopeContext<'_>,
        entity: EntityId,
        state: &State,
        ticks_since_send: Option<u32>,
    ) -> Option<f32>;
}

/// Every entity is in scope; staler entities get higher priority.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysInScope;

impl ScopeEvaluator for AlwaysInScope {
    fn evaluate(
        &self,
        _ctx: &ScopeContext<'_>,
        _entity: EntityId,
        _state: &State,
        ticks_since_send: Option<u32>,
    ) -> Option<f32> {
        Some(ticks_since_send.map_or(f32::MAX, |ticks| ticks as f32))
    }
}

/// Where a [`DistanceEvaluator`] measures from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Origin {
    /// A fixed point in the world.
    Fixed(Vec3),
    /// The first entity the peer controls; nothing is in scope without one.
    Controlled,
}

/// In scope within `radius` of an origin; closer entities first.
///
/// Entities the peer controls are always in scope at the highest priority.
pub struct DistanceEvaluator<P> {
    origin: Origin,
    radius: f32,
    position: P,
}

impl<P> DistanceEvaluator<P>
where
    P: Fn(&State) -> Option<Vec3> + Send,
{
    /// `position` reads an entity's position from its state; entities
    /// without one are out of scope.
    pub fn new(origin: Origin, radius: f32, position: P) -> Self {
        Self {
            origin,
            radius,
            position,
        }
    }

    fn origin(&self, ctx: &ScopeContext<'_>) -> Option<Vec3> {
        match self.origin {
            Origin::Fixed(point) => Some(point),
            Origin::Controlled => ctx
                .controlled
                .iter()
                .find_map(|&entity| ctx.snapshot.get(entity))
                .and_then(|state| (self.position)(state)),
        }
    }
}

impl<P> ScopeEvaluator for DistanceEvaluator<P>
where
    P: Fn(&State) -> Option<Vec3> + Send,
{
    fn evaluate(
        &self,
        ctx: &ScopeContext<'_>,
        entity: EntityId,
        state: &State,
        _ticks_since_send: Option<u32>,
    ) -> Option<f32> {
        if ctx.controlled.contains(&entity) {
            return Some(f32::MAX);
        }
        let origin = self.origin(ctx)?;
        let position = (self.position)(state)?;
        let distance_sq = position.distance_sq(origin);
        let radius_sq = self.radius * self.radius;
        (distance_sq <= radius_sq).then(|| radius_sq - distance_sq)
    }
}

/// Adapts a closure into an evaluator.
pub struct FnEvaluator<F>(F);

impl<F> FnEvaluator<F>
where
    F: Fn(&ScopeContext<'_>, EntityId, &State, Option<u32>) -> Option<f32> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ScopeEvaluator for FnEvaluator<F>
where
    F: Fn(&ScopeContext<'_>, EntityId, &State, Option<u32>) -> Option<f32> + Send,
{
    fn evaluate(
        &self,
        ctx: &ScopeContext<'_>,
        entity: EntityId,
        state: &State,
        ticks_since_send: Option<u32>,
    ) -> Option<f32> {
        (self.0)(ctx, entity, state, ticks_since_send)
    }
}
