//! Grouping and aggregate folds.

use crate::plan::{resolve_all, Plan, Slot, Tuple};
use std::ops::Range;
use std::sync::Arc;
use tessera_core::{Fact, Value};

/// Aggregate executor.
///
/// Splits sorted tuples into groups and folds aggregate primitives over a
/// group's window.
pub(crate) struct AggregateExecutor<'p> {
    plan: &'p Plan,
}

impl<'p> AggregateExecutor<'p> {
    /// Creates a new aggregate executor.
    pub(crate) fn new(plan: &'p Plan) -> Self {
        Self { plan }
    }

    /// Returns true if the plan folds aggregates.
    pub(crate) fn folds(&self) -> bool {
        !self.plan.aggregates.is_empty()
    }

    /// Splits tuples, already sorted with group keys first, into runs of
    /// equal group keys. Without group keys all tuples form one group.
    pub(crate) fn groups(&self, tuples: &[Tuple]) -> Vec<Range<usize>> {
        if tuples.is_empty() {
            return Vec::new();
        }
        if self.plan.groups.is_empty() {
            return vec![0..tuples.len()];
        }
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..tuples.len() {
            if self.key(&tuples[i]) != self.key(&tuples[start]) {
                groups.push(start..i);
                start = i;
            }
        }
        groups.push(start..tuples.len());
        groups
    }

    fn key<'t>(&self, tuple: &'t [Slot]) -> Vec<Option<&'t Value>> {
        self.plan
            .groups
            .iter()
            .map(|(slot, field)| tuple.get(*slot).and_then(Slot::fact).and_then(|f| f.get(field)))
            .collect()
    }

    /// Folds every aggregate over `window` and binds the states into
    /// `target`. Tuples with an unbound argument are skipped.
    pub(crate) fn fold(&self, window: &[Tuple], target: &mut Tuple) {
        for aggregate in &self.plan.aggregates {
            let mut state = Fact::new();
            for tuple in window {
                if let Some(values) = resolve_all(&aggregate.args, tuple) {
                    aggregate.primitive.accumulate(&mut state, &values);
                }
            }
            target[aggregate.slot] = Slot::Computed(Arc::new(state));
        }
    }
}
