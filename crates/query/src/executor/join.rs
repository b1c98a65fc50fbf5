//! Nested-loop join over a compiled plan.

use crate::plan::{resolve_all, Plan, PlanStep, Slot, Tuple};
use std::sync::Arc;
use tessera_core::Row;
use tessera_storage::TableStore;

/// Nested-loop join executor.
///
/// Walks the plan steps depth first. Each scan looks up the rows matching
/// its constants and the fields bound by earlier slots, building an index
/// over those fields on first use. Every tuple that survives all steps is
/// collected.
pub(crate) struct NestedLoopJoin<'p> {
    plan: &'p Plan,
}

impl<'p> NestedLoopJoin<'p> {
    /// Creates a join executor for the plan.
    pub(crate) fn new(plan: &'p Plan) -> Self {
        Self { plan }
    }

    /// Runs the join. With `roots`, the first scan binds only those rows.
    pub(crate) fn execute(&self, store: &mut TableStore, roots: Option<&[Row]>) -> Vec<Tuple> {
        let mut output = Vec::new();
        let mut tuple = vec![Slot::Empty; self.plan.width];
        self.descend(store, roots, 0, &mut tuple, &mut output);
        output
    }

    fn descend(
        &self,
        store: &mut TableStore,
        roots: Option<&[Row]>,
        depth: usize,
        tuple: &mut Tuple,
        output: &mut Vec<Tuple>,
    ) {
        let Some(step) = self.plan.steps.get(depth) else {
            output.push(tuple.clone());
            return;
        };
        match step {
            PlanStep::Scan { slot, scan } => {
                let rows = match roots {
                    Some(roots) if depth == 0 => roots.to_vec(),
                    _ => match scan.pattern(tuple) {
                        Some(pattern) => store.find(&scan.table, &pattern),
                        None => return,
                    },
                };
                for row in rows {
                    tuple[*slot] = Slot::Row(row);
                    self.descend(store, roots, depth + 1, tuple, output);
                }
                tuple[*slot] = Slot::Empty;
            }
            PlanStep::Anti(scan) => {
                // An unbound reference can never match, so nothing blocks.
                let blocked = match scan.pattern(tuple) {
                    Some(pattern) => !store.find(&scan.table, &pattern).is_empty(),
                    None => false,
                };
                if !blocked {
                    self.descend(store, roots, depth + 1, tuple, output);
                }
            }
            PlanStep::Filter { primitive, args } => {
                let pass = resolve_all(args, tuple).is_some_and(|values| primitive.test(&values));
                if pass {
                    self.descend(store, roots, depth + 1, tuple, output);
                }
            }
            PlanStep::Compute { primitive, args, slot } => {
                let Some(result) = resolve_all(args, tuple).and_then(|values| primitive.compute(&values)) else {
                    return;
                };
                tuple[*slot] = Slot::Computed(Arc::new(result));
                self.descend(store, roots, depth + 1, tuple, output);
                tuple[*slot] = Slot::Empty;
            }
        }
    }
}
