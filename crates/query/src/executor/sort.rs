//! Sort executor.

use crate::binding::Direction;
use crate::plan::{Slot, Tuple};
use std::cmp::Ordering;

/// Sort executor - orders tuples by `(slot, field, direction)` keys.
///
/// The sort is stable, so tuples with equal keys keep join order. A missing
/// value sorts before any present one.
pub(crate) struct SortExecutor<'p> {
    order: &'p [(usize, String, Direction)],
}

impl<'p> SortExecutor<'p> {
    /// Creates a new sort executor.
    pub(crate) fn new(order: &'p [(usize, String, Direction)]) -> Self {
        Self { order }
    }

    /// Sorts the tuples in place.
    pub(crate) fn execute(&self, tuples: &mut [Tuple]) {
        if self.order.is_empty() {
            return;
        }
        tuples.sort_by(|a, b| self.compare(a, b));
    }

    fn compare(&self, a: &[Slot], b: &[Slot]) -> Ordering {
        for (slot, field, direction) in self.order {
            let a_val = a.get(*slot).and_then(Slot::fact).and_then(|f| f.get(field));
            let b_val = b.get(*slot).and_then(Slot::fact).and_then(|f| f.get(field));

            let cmp = match (a_val, b_val) {
                (Some(av), Some(bv)) => av.cmp(bv),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };

            if cmp != Ordering::Equal {
                return match direction {
                    Direction::Ascending => cmp,
                    Direction::Descending => cmp.reverse(),
                };
            }
        }
        Ordering::Equal
    }
}
