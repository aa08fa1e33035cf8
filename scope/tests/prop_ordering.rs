use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use codec::{EntityId, Snapshot, State, Tick};
use proptest::prelude::*;
use schema::{FieldValue, TypeKind};
use scope::{FnEvaluator, Scope, ScopeContext};

proptest! {
    #[test]
    fn selection_is_ranked_and_unique(
        priorities in prop::collection::btree_map(1u32..200, prop::option::of(0u8..4), 0..40),
    ) {
        let mut snapshot = Snapshot::new(Tick::new(0));
        for &id in priorities.keys() {
            snapshot.insert(
                EntityId::new(id),
                State::from_values(TypeKind::new(1).unwrap(), vec![FieldValue::Bool(true)]),
            );
        }
        let table: BTreeMap<u32, Option<u8>> = priorities.clone();
        let mut scope = Scope::new(
            FnEvaluator::new(move |_: &ScopeContext<'_>, entity: EntityId, _, _| {
                table[&entity.raw()].map(f32::from)
            }),
            NonZeroUsize::new(4).unwrap(),
        );

        let selected = scope.evaluate(Tick::new(0), &snapshot, &BTreeSet::new());

        let expected: usize = priorities.values().filter(|p| p.is_some()).count();
        prop_assert_eq!(selected.len(), expected);
        let unique: BTreeSet<EntityId> = selected.iter().copied().collect();
        prop_assert_eq!(unique.len(), selected.len());
        for pair in selected.windows(2) {
            let a = priorities[&pair[0].raw()];
            let b = priorities[&pair[1].raw()];
            prop_assert!(a > b || (a == b && pair[0] < pair[1]));
        }
    }
}
