//! Bounded tick-keyed history.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::delta::StateDelta;
use crate::error::HistoryError;
use crate::state::{Snapshot, State};
use crate::{EntityId, Tick};

/// The newest `capacity` values, keyed by strictly increasing ticks.
///
/// Entries stay sorted by tick, so lookups are a binary search even when the
/// stored ticks are sparse (one per send interval).
#[derive(Debug, Clone)]
pub struct TickRing<T> {
    entries: VecDeque<(Tick, T)>,
    capacity: NonZeroUsize,
}

impl<T> TickRing<T> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `value` for `tick`, dropping the oldest entry once full.
    ///
    /// # Errors
    ///
    /// Fails for [`Tick::INVALID`] and for a tick not after the newest one.
    pub fn insert(&mut self, tick: Tick, value: T) -> Result<(), HistoryError> {
        if !tick.is_valid() {
            return Err(HistoryError::InvalidTick);
        }
        match self.entries.back() {
            Some(&(newest, _)) if tick <= newest => {
                return Err(HistoryError::OutOfOrder {
                    last_tick: newest,
                    new_tick: tick,
                });
            }
            _ => {}
        }
        if self.entries.len() == self.capacity.get() {
            self.entries.pop_front();
        }
        self.entries.push_back((tick, value));
        Ok(())
    }

    /// The value stored for exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&T> {
        let (oldest, _) = self.entries.front()?;
        let (newest, _) = self.entries.back()?;
        if tick < *oldest || tick > *newest {
            return None;
        }
        let index = self
            .entries
            .binary_search_by_key(&tick, |&(stored, _)| stored)
            .ok()?;
        self.entries.get(index).map(|(_, value)| value)
    }

    /// The newest tick and its value.
    #[must_use]
    pub fn latest(&self) -> Option<(Tick, &T)> {
        self.entries.back().map(|(tick, value)| (*tick, value))
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Tick, &T)> {
        self.entries.iter().map(|(tick, value)| (*tick, value))
    }
}

/// The last K world snapshots, used as delta baselines.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    ring: TickRing<Snapshot>,
}

impl SnapshotHistory {
    /// Creates a history retaining at most `capacity` snapshots.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            ring: TickRing::new(capacity),
        }
    }

    /// Appends a snapshot, evicting the oldest when full.
    pub fn store(&mut self, snapshot: Snapshot) -> Result<(), HistoryError> {
        self.ring.insert(snapshot.tick(), snapshot)
    }

    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&Snapshot> {
        self.ring.get(tick)
    }

    #[must_use]
    pub fn latest(&self) -> Option<&Snapshot> {
        self.ring.latest().map(|(_, snapshot)| snapshot)
    }

    /// An entity's state at an exact tick still in range.
    #[must_use]
    pub fn state_at(&self, tick: Tick, entity: EntityId) -> Option<&State> {
        self.get(tick).and_then(|snapshot| snapshot.get(entity))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Builds one delta per selected entity against a shared baseline tick.
    ///
    /// Entities missing from the baseline (never existed, or the baseline was
    /// evicted) get a full state. Selected entities missing from `target`
    /// are skipped.
    #[must_use]
    pub fn create_delta(
        &self,
        baseline: Tick,
        target: &Snapshot,
        selected: &[EntityId],
    ) -> Vec<StateDelta> {
        self.create_delta_with(target, selected, |_| baseline.valid())
    }

    /// Like [`create_delta`](Self::create_delta), with a baseline chosen per
    /// entity (`None` forces a full state).
    pub fn create_delta_with<F>(
        &self,
        target: &Snapshot,
        selected: &[EntityId],
        mut baseline_for: F,
    ) -> Vec<StateDelta>
    where
        F: FnMut(EntityId) -> Option<Tick>,
    {
        selected
            .iter()
            .filter_map(|&entity| {
                let state = target.get(entity)?;
                let baseline = baseline_for(entity).and_then(|tick| {
                    self.state_at(tick, entity)
                        .map(|baseline_state| (tick, baseline_state))
                });
                Some(StateDelta::diff(entity, baseline, state))
            })
            .collect()
    }
}
