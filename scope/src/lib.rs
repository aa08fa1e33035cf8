//! Scope: decide what each peer receives, not how it is encoded.
//!
//! A [`Scope`] belongs to one peer. Every send tick it ranks the world's
//! entities through a [`ScopeEvaluator`], remembers what went out in which
//! packet, and turns the peer's acknowledgments into per-entity delta
//! baselines and settled removals.

mod evaluator;
mod tracker;

pub use evaluator::{
    AlwaysInScope, DistanceEvaluator, FnEvaluator, Origin, ScopeContext, ScopeEvaluator,
};
pub use tracker::{Scope, ScopeBudget, SentRecord};

/// Basic 3D vector for spatial queries.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}
