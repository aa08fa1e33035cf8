//! Per-peer scope bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use codec::{EntityId, HistoryError, Snapshot, Tick, TickRing};
use tracing::trace;

use crate::evaluator::{ScopeContext, ScopeEvaluator};

/// Caps on what a single packet may carry for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeBudget {
    pub max_deltas: usize,
    pub max_removals: usize,
}

impl ScopeBudget {
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_deltas: usize::MAX,
            max_removals: usize::MAX,
        }
    }
}

impl Default for ScopeBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// What one packet carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentRecord {
    pub entities: Vec<EntityId>,
    pub removals: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy)]
struct Visibility {
    /// First send of the current visibility period.
    since: Tick,
    last_sent: Tick,
    acked: Option<Tick>,
}

/// Interest state for one peer.
///
/// An entity is *visible* from the first packet that carries it until it
/// leaves scope or the world. Leaving schedules a removal marker that rides
/// every packet until the peer acknowledges one of them.
pub struct Scope {
    evaluator: Box<dyn ScopeEvaluator>,
    budget: ScopeBudget,
    visible: BTreeMap<EntityId, Visibility>,
    pending_removals: BTreeSet<EntityId>,
    sent_log: TickRing<SentRecord>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("budget", &self.budget)
            .field("visible", &self.visible.len())
            .field("pending_removals", &self.pending_removals)
            .finish_non_exhaustive()
    }
}

impl Scope {
    /// Creates a scope remembering the last `log_capacity` sent packets.
    ///
    /// Acks for older packets are ignored, so the capacity should match the
    /// server's snapshot history.
    pub fn new(evaluator: impl ScopeEvaluator + 'static, log_capacity: NonZeroUsize) -> Self {
        Self {
            evaluator: Box::new(evaluator),
            budget: ScopeBudget::unlimited(),
            visible: BTreeMap::new(),
            pending_removals: BTreeSet::new(),
            sent_log: TickRing::new(log_capacity),
        }
    }

    #[must_use]
    pub fn with_budget(mut self, budget: ScopeBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn set_evaluator(&mut self, evaluator: impl ScopeEvaluator + 'static) {
        self.evaluator = Box::new(evaluator);
    }

    #[must_use]
    pub fn budget(&self) -> ScopeBudget {
        self.budget
    }

    /// Ranks the entities of `snapshot` for this peer.
    ///
    /// Returns in-scope entities by priority descending, then id ascending,
    /// capped by the delta budget. Visible entities that are out of scope or
    /// gone from the world get a pending removal marker.
    pub fn evaluate(
        &mut self,
        tick: Tick,
        snapshot: &Snapshot,
        controlled: &BTreeSet<EntityId>,
    ) -> Vec<EntityId> {
        let ctx = ScopeContext {
            tick,
            snapshot,
            controlled,
        };

        let mut ranked: Vec<(f32, EntityId)> = snapshot
            .iter()
            .filter_map(|(entity, state)| {
                let since_send = self
                    .visible
                    .get(&entity)
                    .and_then(|visibility| tick.since(visibility.last_sent));
                self.evaluator
                    .evaluate(&ctx, entity, state, since_send)
                    .filter(|priority| !priority.is_nan())
                    .map(|priority| (priority, entity))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let in_scope: BTreeSet<EntityId> = ranked.iter().map(|&(_, entity)| entity).collect();
        let leaving: Vec<EntityId> = self
            .visible
            .keys()
            .filter(|entity| !in_scope.contains(entity))
            .copied()
            .collect();
        for entity in leaving {
            trace!(%entity, %tick, "entity left scope");
            self.forget(entity);
        }

        ranked
            .into_iter()
            .map(|(_, entity)| entity)
            .take(self.budget.max_deltas)
            .collect()
    }

    /// Removal markers to put in the next packet, ascending.
    #[must_use]
    pub fn removals(&self) -> Vec<EntityId> {
        self.pending_removals
            .iter()
            .copied()
            .take(self.budget.max_removals)
            .collect()
    }

    /// Schedules a removal marker for an entity that left the world.
    pub fn remove_entity(&mut self, entity: EntityId) {
        self.forget(entity);
    }

    /// The tick of the newest acknowledged packet that carried `entity`
    /// during its current visibility period.
    #[must_use]
    pub fn baseline_for(&self, entity: EntityId) -> Option<Tick> {
        self.visible.get(&entity).and_then(|visibility| visibility.acked)
    }

    /// Returns `true` while the peer is believed to hold `entity`.
    #[must_use]
    pub fn is_visible(&self, entity: EntityId) -> bool {
        self.visible.contains_key(&entity)
    }

    #[must_use]
    pub fn last_sent(&self, entity: EntityId) -> Option<Tick> {
        self.visible.get(&entity).map(|visibility| visibility.last_sent)
    }

    #[must_use]
    pub fn has_pending_removal(&self, entity: EntityId) -> bool {
        self.pending_removals.contains(&entity)
    }

    /// Records what the packet of `tick` carried.
    pub fn record_sent(
        &mut self,
        tick: Tick,
        entities: &[EntityId],
        removals: &[EntityId],
    ) -> Result<(), HistoryError> {
        self.sent_log.insert(
            tick,
            SentRecord {
                entities: entities.to_vec(),
                removals: removals.to_vec(),
            },
        )?;
        for &entity in entities {
            self.pending_removals.remove(&entity);
            self.visible
                .entry(entity)
                .and_modify(|visibility| visibility.last_sent = tick)
                .or_insert(Visibility {
                    since: tick,
                    last_sent: tick,
                    acked: None,
                });
        }
        Ok(())
    }

    /// Applies the peer's acknowledgment of the packet sent at `ack_tick`.
    pub fn integrate_ack(&mut self, ack_tick: Tick) {
        if !ack_tick.is_valid() {
            return;
        }
        let Some(record) = self.sent_log.get(ack_tick) else {
            trace!(%ack_tick, "ack for unknown or expired packet");
            return;
        };
        for entity in &record.entities {
            if let Some(visibility) = self.visible.get_mut(entity) {
                if ack_tick >= visibility.since && visibility.acked.map_or(true, |t| t < ack_tick) {
                    visibility.acked = Some(ack_tick);
                }
            }
        }
        for entity in &record.removals {
            if self.pending_removals.remove(entity) {
                trace!(%entity, %ack_tick, "removal acknowledged");
            }
        }
    }

    fn forget(&mut self, entity: EntityId) {
        if self.visible.remove(&entity).is_some() {
            self.pending_removals.insert(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{AlwaysInScope, FnEvaluator};
    use codec::State;
    use schema::{FieldValue, TypeKind};

    fn world(tick: u32, ids: &[u32]) -> Snapshot {
        let mut snapshot = Snapshot::new(Tick::new(tick));
        for &id in ids {
            snapshot.insert(
                EntityId::new(id),
                State::from_values(TypeKind::new(1).unwrap(), vec![FieldValue::UInt(0)]),
            );
        }
        snapshot
    }

    fn ids(entities: &[EntityId]) -> Vec<u32> {
        entities.iter().map(|e| e.raw()).collect()
    }

    fn scope() -> Scope {
        Scope::new(AlwaysInScope, NonZeroUsize::new(8).unwrap())
    }

    #[test]
    fn orders_by_priority_then_id() {
        let mut scope = Scope::new(
            FnEvaluator::new(|_, entity: EntityId, _, _| {
                Some(if entity.raw() >= 3 { 2.0 } else { 1.0 })
            }),
            NonZeroUsize::new(4).unwrap(),
        );
        let selected = scope.evaluate(Tick::new(0), &world(0, &[1, 2, 3, 4]), &BTreeSet::new());
        assert_eq!(ids(&selected), vec![3, 4, 1, 2]);
    }

    #[test]
    fn budget_caps_selection() {
        let mut scope = scope().with_budget(ScopeBudget {
            max_deltas: 2,
            max_removals: 1,
        });
        let selected = scope.evaluate(Tick::new(0), &world(0, &[1, 2, 3]), &BTreeSet::new());
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn staleness_rotates_through_entities() {
        let mut scope = scope().with_budget(ScopeBudget {
            max_deltas: 1,
            max_removals: usize::MAX,
        });
        let snapshot = world(0, &[1, 2]);
        let first = scope.evaluate(Tick::new(0), &snapshot, &BTreeSet::new());
        scope.record_sent(Tick::new(0), &first, &[]).unwrap();
        let second = scope.evaluate(Tick::new(1), &snapshot, &BTreeSet::new());
        assert_ne!(first, second);
    }

    #[test]
    fn ack_sets_baseline() {
        let mut scope = scope();
        let snapshot = world(0, &[1]);
        let selected = scope.evaluate(Tick::new(0), &snapshot, &BTreeSet::new());
        scope.record_sent(Tick::new(0), &selected, &[]).unwrap();
        assert_eq!(scope.baseline_for(EntityId::new(1)), None);

        scope.integrate_ack(Tick::new(0));
        assert_eq!(scope.baseline_for(EntityId::new(1)), Some(Tick::new(0)));

        scope.record_sent(Tick::new(1), &selected, &[]).unwrap();
        scope.integrate_ack(Tick::new(1));
        scope.integrate_ack(Tick::new(0));
        assert_eq!(scope.baseline_for(EntityId::new(1)), Some(Tick::new(1)));
    }

    #[test]
    fn removal_resent_until_acked() {
        let mut scope = scope();
        scope.record_sent(Tick::new(0), &[EntityId::new(1)], &[]).unwrap();
        scope.remove_entity(EntityId::new(1));
        assert!(!scope.is_visible(EntityId::new(1)));

        for tick in 1..=3 {
            let removals = scope.removals();
            assert_eq!(ids(&removals), vec![1]);
            scope.record_sent(Tick::new(tick), &[], &removals).unwrap();
        }
        scope.integrate_ack(Tick::new(2));
        assert!(scope.removals().is_empty());
    }

    #[test]
    fn unsent_entity_needs_no_removal() {
        let mut scope = scope();
        scope.remove_entity(EntityId::new(5));
        assert!(scope.removals().is_empty());
    }

    #[test]
    fn leaving_scope_schedules_removal() {
        let mut scope = Scope::new(
            FnEvaluator::new(|ctx: &ScopeContext<'_>, _, _, _| {
                (ctx.tick.raw() < 2).then_some(1.0)
            }),
            NonZeroUsize::new(8).unwrap(),
        );
        let snapshot = world(0, &[1]);
        let selected = scope.evaluate(Tick::new(0), &snapshot, &BTreeSet::new());
        scope.record_sent(Tick::new(0), &selected, &[]).unwrap();
        scope.integrate_ack(Tick::new(0));

        let selected = scope.evaluate(Tick::new(2), &snapshot, &BTreeSet::new());
        assert!(selected.is_empty());
        assert_eq!(ids(&scope.removals()), vec![1]);
        assert_eq!(scope.baseline_for(EntityId::new(1)), None);
    }

    #[test]
    fn reentry_ignores_acks_from_before() {
        let mut scope = scope();
        scope.record_sent(Tick::new(0), &[EntityId::new(1)], &[]).unwrap();
        scope.remove_entity(EntityId::new(1));
        scope.record_sent(Tick::new(1), &[EntityId::new(1)], &[]).unwrap();
        assert!(!scope.has_pending_removal(EntityId::new(1)));

        scope.integrate_ack(Tick::new(0));
        assert_eq!(scope.baseline_for(EntityId::new(1)), None);
        scope.integrate_ack(Tick::new(1));
        assert_eq!(scope.baseline_for(EntityId::new(1)), Some(Tick::new(1)));
    }

    #[test]
    fn out_of_order_record_rejected() {
        let mut scope = scope();
        scope.record_sent(Tick::new(4), &[], &[]).unwrap();
        assert!(scope.record_sent(Tick::new(4), &[], &[]).is_err());
    }
}
