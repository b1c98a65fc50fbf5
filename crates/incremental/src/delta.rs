//! Signed changes and their settlement against a view's prior contents.
//!
//! An incremental evaluation suggests additions (every re-derived output)
//! and removals (every output that lost its last derivation). Settling nets
//! the two per identity, so an output that is both retracted and re-derived
//! in the same pass stays put.

use hashbrown::HashMap;
use tessera_core::{FactId, Row};
use tessera_storage::{Table, TableChanges};

/// A differential change to a data item.
///
/// `diff` is the multiplicity: `+1` inserts, `-1` deletes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta<T> {
    /// The data being changed.
    pub data: T,
    /// The differential: +1 for insert, -1 for delete.
    pub diff: i32,
}

impl<T> Delta<T> {
    /// Creates an insertion delta (+1).
    #[inline]
    pub fn insert(data: T) -> Self {
        Self { data, diff: 1 }
    }

    /// Creates a deletion delta (-1).
    #[inline]
    pub fn delete(data: T) -> Self {
        Self { data, diff: -1 }
    }
}

/// Nets row deltas by identity and resolves them against a prior table.
///
/// A positive net count becomes an add unless the row is already present.
/// A negative net count becomes a remove only if the row is present.
/// Output order follows first appearance.
pub fn settle<I>(deltas: I, prior: Option<&Table>) -> TableChanges
where
    I: IntoIterator<Item = Delta<Row>>,
{
    let mut order: Vec<FactId> = Vec::new();
    let mut counts: HashMap<FactId, (i64, Row)> = HashMap::new();
    for delta in deltas {
        let id = delta.data.id();
        let entry = counts.entry(id).or_insert_with(|| {
            order.push(id);
            (0, delta.data)
        });
        entry.0 += i64::from(delta.diff);
    }

    let present = |id: FactId| prior.is_some_and(|table| table.contains(id));
    let mut changes = TableChanges::new();
    for id in order {
        let Some((count, row)) = counts.remove(&id) else {
            continue;
        };
        if count > 0 && !present(id) {
            changes.adds.push(row);
        } else if count < 0 && present(id) {
            changes.removes.push(row);
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tessera_core::fact;

    fn row(n: i32) -> Row {
        let f = fact! { "n" => n };
        Row::new(f.identity(&["n".to_string()]), Arc::new(f))
    }

    fn prior_with(rows: &[i32]) -> Table {
        let mut table = Table::new("v", vec!["n".to_string()]);
        let facts: Vec<_> = rows.iter().map(|n| Arc::new(fact! { "n" => *n })).collect();
        table.update(&facts, &[]);
        table
    }

    #[test]
    fn test_delta_insert_delete() {
        assert_eq!(Delta::insert(42).diff, 1);
        let d = Delta::delete(42);
        assert_eq!((d.data, d.diff), (42, -1));
    }

    #[test]
    fn test_settle_drops_existing_adds() {
        let prior = prior_with(&[1]);
        let changes = settle(vec![Delta::insert(row(1)), Delta::insert(row(2))], Some(&prior));
        assert_eq!(changes.adds, vec![row(2)]);
        assert!(changes.removes.is_empty());
    }

    #[test]
    fn test_settle_cancels_rederived_rows() {
        let prior = prior_with(&[1]);
        let changes = settle(vec![Delta::delete(row(1)), Delta::insert(row(1))], Some(&prior));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_settle_removes_only_present_rows() {
        let prior = prior_with(&[1]);
        let changes = settle(vec![Delta::delete(row(1)), Delta::delete(row(3))], Some(&prior));
        assert_eq!(changes.removes, vec![row(1)]);
    }

    #[test]
    fn test_settle_without_prior() {
        let changes = settle(vec![Delta::insert(row(1)), Delta::delete(row(2))], None);
        assert_eq!(changes.adds, vec![row(1)]);
        assert!(changes.removes.is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        proptest! {
            /// Settled changes never add a present row or remove an absent one.
            #[test]
            fn settle_respects_prior(
                prior in prop::collection::btree_set(0i32..6, 0..6),
                deltas in prop::collection::vec((0i32..6, any::<bool>()), 0..16),
            ) {
                let prior_rows: Vec<i32> = prior.iter().copied().collect();
                let table = prior_with(&prior_rows);

                let mut net: BTreeMap<i32, i64> = BTreeMap::new();
                for (n, insert) in &deltas {
                    *net.entry(*n).or_default() += if *insert { 1 } else { -1 };
                }
                let changes = settle(
                    deltas.iter().map(|(n, insert)| if *insert { Delta::insert(row(*n)) } else { Delta::delete(row(*n)) }),
                    Some(&table),
                );

                let expected_adds = net.iter().filter(|(n, c)| **c > 0 && !prior.contains(*n)).count();
                let expected_removes = net.iter().filter(|(n, c)| **c < 0 && prior.contains(*n)).count();
                prop_assert_eq!(changes.adds.len(), expected_adds);
                prop_assert_eq!(changes.removes.len(), expected_removes);
                for added in &changes.adds {
                    prop_assert!(!table.contains(added.id()));
                }
                for removed in &changes.removes {
                    prop_assert!(table.contains(removed.id()));
                }
            }
        }
    }
}
