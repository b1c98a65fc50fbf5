//! Query executor module.
//!
//! Evaluation runs in two phases. The nested-loop join produces every
//! tuple that satisfies the join steps. The tuples are then sorted,
//! grouped, windowed, folded, ranked and projected into output rows, each
//! carrying provenance back to the source rows of its supporting tuples.

mod aggregate;
pub(crate) mod incremental;
mod join;
mod limit;
mod project;
mod sort;

use crate::plan::{Plan, Slot, Tuple};
use aggregate::AggregateExecutor;
use hashbrown::HashSet;
use join::NestedLoopJoin;
use limit::LimitExecutor;
use project::ProjectExecutor;
use sort::SortExecutor;
use std::ops::Range;
use std::sync::Arc;
use tessera_core::{Fact, FactId, Row};
use tessera_incremental::{settle, Delta, ProvenanceLedger, ProvenanceRecord};
use tessera_storage::{TableChanges, TableStore};
use tracing::trace;

/// Result of evaluating a query or union.
#[derive(Clone, Debug, Default)]
pub struct QueryOutput {
    /// Distinct output rows in result order.
    pub results: Vec<Row>,
    /// The finished tuple behind each emitted result, before projection.
    pub unprojected: Vec<Tuple>,
    /// One record per (output row, contributing source row).
    pub provenance: Vec<ProvenanceRecord>,
}

impl QueryOutput {
    /// Identities of the output rows.
    pub fn ids(&self) -> impl Iterator<Item = FactId> + '_ {
        self.results.iter().map(Row::id)
    }
}

/// Evaluates the plan against the whole store.
pub(crate) fn evaluate(plan: &Plan, view: &str, store: &mut TableStore) -> QueryOutput {
    let tuples = NestedLoopJoin::new(plan).execute(store, None);
    trace!(view, tuples = tuples.len(), "joined");
    finish(plan, view, tuples)
}

struct Unit {
    tuple: Tuple,
    support: Range<usize>,
}

/// Turns joined tuples into output rows.
pub(crate) fn finish(plan: &Plan, view: &str, mut tuples: Vec<Tuple>) -> QueryOutput {
    SortExecutor::new(&plan.order).execute(&mut tuples);

    let aggregates = AggregateExecutor::new(plan);
    let limit = LimitExecutor::new(plan.limit);
    let windows = limit.windows(aggregates.groups(&tuples));

    let mut units = Vec::new();
    for window in windows {
        if aggregates.folds() {
            let mut tuple = tuples[window.end - 1].clone();
            aggregates.fold(&tuples[window.clone()], &mut tuple);
            units.push(Unit { tuple, support: window });
        } else {
            units.extend(window.map(|i| Unit {
                tuple: tuples[i].clone(),
                support: i..i + 1,
            }));
        }
    }
    let units = limit.execute(units);

    let project = ProjectExecutor::new(plan.projection.as_deref(), &plan.output_fields);
    let mut output = QueryOutput::default();
    let mut seen = HashSet::new();
    for (rank, mut unit) in units.into_iter().enumerate() {
        if let Some(slot) = plan.ordinal {
            let ordinal = Fact::new().with("ordinal", rank);
            unit.tuple[slot] = Slot::Computed(Arc::new(ordinal));
        }
        if let Some(row) = project.execute(&unit.tuple) {
            for supporting in &tuples[unit.support.clone()] {
                output.provenance.extend(provenance(plan, view, row.id(), supporting));
            }
            if seen.insert(row.id()) {
                output.results.push(row);
            }
        }
        output.unprojected.push(unit.tuple);
    }
    output
}

/// Provenance of one output row through one supporting tuple. The row
/// instance is the combination of the joined source rows.
pub(crate) fn provenance(plan: &Plan, view: &str, row: FactId, tuple: &[Slot]) -> Vec<ProvenanceRecord> {
    let sources: Vec<(&str, FactId)> = plan
        .joins
        .iter()
        .filter_map(|(slot, table)| {
            let source = tuple.get(*slot)?.row()?;
            Some((table.as_str(), source.id()))
        })
        .collect();
    let instance = FactId::combine(sources.iter().map(|(_, id)| *id));
    sources
        .into_iter()
        .map(|(table, source)| ProvenanceRecord::new(view, row, instance, table, source))
        .collect()
}

/// Diffs a complete evaluation against the view table's current contents
/// and replaces the view's provenance.
pub(crate) fn full_delta(
    view: &str,
    output: QueryOutput,
    store: &TableStore,
    ledger: &mut ProvenanceLedger,
) -> TableChanges {
    let prior = store.get(view);
    let fresh: HashSet<FactId> = output.ids().collect();
    let stale = prior
        .into_iter()
        .flat_map(|table| table.rows())
        .filter(|row| !fresh.contains(&row.id()))
        .map(|row| Delta::delete(row.clone()));
    let deltas: Vec<Delta<Row>> = output.results.into_iter().map(Delta::insert).chain(stale).collect();
    let changes = settle(deltas, prior);
    ledger.replace_view(view, output.provenance);
    trace!(view, adds = changes.adds.len(), removes = changes.removes.len(), "full delta");
    changes
}
