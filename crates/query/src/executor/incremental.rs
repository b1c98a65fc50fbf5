//! Incremental maintenance of join views.
//!
//! Added rows are traced back through the join to the root rows they can
//! combine with, and the forward plan is re-run from those roots only.
//! Removed rows are handled by truth maintenance over the provenance
//! ledger.

use super::{finish, NestedLoopJoin};
use crate::plan::{Plan, PlanStep, ScanStep, Slot, Tuple};
use hashbrown::HashSet;
use tessera_core::{Fact, FactId, Row};
use tessera_incremental::{retract, settle, Delta, ProvenanceLedger};
use tessera_storage::{Changes, TableChanges, TableStore};
use tracing::trace;

/// Applies one round of changes to a view maintained by `plan`.
pub(crate) fn apply(
    plan: &Plan,
    view: &str,
    store: &mut TableStore,
    ledger: &mut ProvenanceLedger,
    changes: &Changes,
) -> TableChanges {
    let roots = roots(plan, store, changes);
    let output = if roots.is_empty() {
        Default::default()
    } else {
        let tuples = NestedLoopJoin::new(plan).execute(store, Some(&roots));
        finish(plan, view, tuples)
    };
    let orphaned = retract(ledger, store, view, changes, true);
    trace!(view, roots = roots.len(), orphaned = orphaned.len(), "incremental round");

    let prior = store.get(view);
    let fresh: HashSet<FactId> = output.ids().collect();
    let removed = orphaned
        .into_iter()
        .filter(|id| !fresh.contains(id))
        .filter_map(|id| prior.and_then(|table| table.get(id)).cloned())
        .map(Delta::delete);
    let deltas: Vec<Delta<Row>> = output.results.into_iter().map(Delta::insert).chain(removed).collect();
    let settled = settle(deltas, prior);
    ledger.record_all(output.provenance);
    settled
}

/// Finds the root rows whose forward evaluation can reach an added row.
///
/// Every changed table is considered at every scan it appears in. From an
/// added row the join is walked backwards: each earlier scan is looked up
/// with the fields that later bound scans reference from it. A scan no
/// bound row references is left unbound, which widens the search but never
/// loses a root.
pub(crate) fn roots(plan: &Plan, store: &mut TableStore, changes: &Changes) -> Vec<Row> {
    let scans: Vec<(usize, &ScanStep)> = plan
        .steps
        .iter()
        .filter_map(|step| match step {
            PlanStep::Scan { slot, scan } => Some((*slot, scan)),
            _ => None,
        })
        .collect();
    let Some(&(_, root)) = scans.first() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut roots = Vec::new();
    let mut keep = |row: Row, roots: &mut Vec<Row>| {
        if seen.insert(row.id()) {
            roots.push(row);
        }
    };

    if let Some(table_changes) = changes.get(&root.table) {
        for row in &table_changes.adds {
            if root.constants_match(row) {
                keep(row.clone(), &mut roots);
            }
        }
    }

    for k in 1..scans.len() {
        let (slot, scan) = scans[k];
        let Some(table_changes) = changes.get(&scan.table) else {
            continue;
        };
        for added in &table_changes.adds {
            if !scan.constants_match(added) {
                continue;
            }
            let mut tuple = vec![Slot::Empty; plan.width];
            tuple[slot] = Slot::Row(added.clone());
            let mut frontier = vec![tuple];
            for j in (1..k).rev() {
                frontier = frontier
                    .into_iter()
                    .flat_map(|tuple| bind_backwards(&scans, j, tuple, store))
                    .collect();
            }
            for tuple in &frontier {
                let Some(pattern) = reverse_pattern(&scans, 0, tuple) else {
                    continue;
                };
                for row in store.find(&root.table, &pattern) {
                    keep(row, &mut roots);
                }
            }
        }
    }
    roots
}

/// Binds scan `j` in every way consistent with the later bound scans.
fn bind_backwards(scans: &[(usize, &ScanStep)], j: usize, tuple: Tuple, store: &mut TableStore) -> Vec<Tuple> {
    let (slot, scan) = scans[j];
    let Some(pattern) = reverse_pattern(scans, j, &tuple) else {
        return Vec::new();
    };
    if pattern.len() == scan.constants.len() {
        return vec![tuple];
    }
    store
        .find(&scan.table, &pattern)
        .into_iter()
        .map(|row| {
            let mut next = tuple.clone();
            next[slot] = Slot::Row(row);
            next
        })
        .collect()
}

/// Pattern for scan `j` from its constants and the references later bound
/// scans make to it. `None` if a referencing row lacks the field.
fn reverse_pattern(scans: &[(usize, &ScanStep)], j: usize, tuple: &[Slot]) -> Option<Fact> {
    let (slot, scan) = scans[j];
    let mut pattern = Fact::new();
    for (field, value) in &scan.constants {
        pattern.insert(field.as_str(), value.clone());
    }
    for &(later_slot, later) in &scans[j + 1..] {
        let Some(row) = tuple.get(later_slot).and_then(Slot::row) else {
            continue;
        };
        for (field, source_slot, source_field) in &later.refs {
            if *source_slot != slot {
                continue;
            }
            let value = row.get(field)?;
            pattern.insert(source_field.as_str(), value.clone());
        }
    }
    Some(pattern)
}
