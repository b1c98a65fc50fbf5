//! Truth maintenance for incrementally evaluated views.
//!
//! Removing a source row retracts every row instance it took part in. An
//! output row whose last instance is gone is reported for removal.
//!
//! Views fed by derived sources can hold instances that point at derived
//! rows which themselves lost all support, or that only support each other
//! through a cycle. With `walk_derived` set, the surviving instances of each
//! affected row are checked against the derived rows that still reach base
//! facts; an instance resting on any other derived row is dropped too.

use hashbrown::{HashMap, HashSet};
use tessera_core::FactId;
use tessera_storage::{Changes, TableStore};
use tracing::trace;

use crate::provenance::ProvenanceLedger;

/// Retracts derivations of `view` invalidated by the removals in `changes`.
///
/// Returns the identities of output rows left without any derivation, in
/// the order they were first affected.
pub fn retract(
    ledger: &mut ProvenanceLedger,
    store: &TableStore,
    view: &str,
    changes: &Changes,
    walk_derived: bool,
) -> Vec<FactId> {
    let mut dropped: HashSet<FactId> = HashSet::new();
    let mut seen: HashSet<FactId> = HashSet::new();
    let mut affected: Vec<FactId> = Vec::new();

    for (source, table_changes) in changes {
        for removed in &table_changes.removes {
            let instances: Vec<FactId> = ledger
                .by_source(view, source, removed.id())
                .into_iter()
                .map(|record| record.row_instance)
                .collect();
            for instance in instances {
                if !dropped.insert(instance) {
                    continue;
                }
                for record in ledger.remove_instance(view, instance) {
                    if seen.insert(record.row) {
                        affected.push(record.row);
                    }
                }
            }
        }
    }

    if walk_derived {
        prune_ungrounded(ledger, store, view, &affected);
    }
    let orphaned: Vec<FactId> = affected
        .into_iter()
        .filter(|row| ledger.supports(view, *row).is_empty())
        .collect();
    trace!(view, orphaned = orphaned.len(), "retracted derivations");
    orphaned
}

type Node = (String, FactId);

/// Drops every instance of `rows` that rests on an ungrounded derived row.
fn prune_ungrounded(ledger: &mut ProvenanceLedger, store: &TableStore, view: &str, rows: &[FactId]) {
    let grounded = grounded_rows(ledger, store, view, rows);
    for row in rows {
        for instance in ledger.instances_of(view, *row) {
            let supported = derived_sources(ledger, store, view, instance)
                .iter()
                .all(|node| grounded.contains(node));
            if !supported {
                ledger.remove_instance(view, instance);
            }
        }
    }
}

/// Derived rows reachable backwards from `rows` that have a chain of
/// instances down to base facts.
///
/// Computed as a least fixpoint: a row is grounded once one of its
/// instances depends only on base facts and rows already grounded. Rows
/// that support each other through a cycle and nothing else never are.
fn grounded_rows(ledger: &ProvenanceLedger, store: &TableStore, view: &str, rows: &[FactId]) -> HashSet<Node> {
    let mut graph: HashMap<Node, Vec<Vec<Node>>> = HashMap::new();
    let mut pending: Vec<Node> = rows.iter().map(|row| (view.to_string(), *row)).collect();
    while let Some(node) = pending.pop() {
        if graph.contains_key(&node) {
            continue;
        }
        let instances: Vec<Vec<Node>> = ledger
            .instances_of(&node.0, node.1)
            .into_iter()
            .map(|instance| derived_sources(ledger, store, &node.0, instance))
            .collect();
        pending.extend(instances.iter().flatten().filter(|dep| !graph.contains_key(*dep)).cloned());
        graph.insert(node, instances);
    }

    let mut grounded: HashSet<Node> = HashSet::new();
    loop {
        let before = grounded.len();
        for (node, instances) in &graph {
            if grounded.contains(node) {
                continue;
            }
            if instances.iter().any(|deps| deps.iter().all(|dep| grounded.contains(dep))) {
                grounded.insert(node.clone());
            }
        }
        if grounded.len() == before {
            return grounded;
        }
    }
}

/// The derived rows one instance of `view` depends on.
fn derived_sources(ledger: &ProvenanceLedger, store: &TableStore, view: &str, instance: FactId) -> Vec<Node> {
    ledger
        .instance(view, instance)
        .into_iter()
        .filter(|record| is_derived(ledger, store, &record.source))
        .map(|record| (record.source.clone(), record.source_row))
        .collect()
}

// View tables without any recorded support are filled by custom triggers
// and count as base facts.
fn is_derived(ledger: &ProvenanceLedger, store: &TableStore, source: &str) -> bool {
    store.get(source).is_some_and(|table| table.is_view()) && ledger.view_len(source) > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::ProvenanceRecord;
    use std::sync::Arc;
    use tessera_core::{fact, Row};
    use tessera_storage::TableChanges;

    fn row(table: &str, n: i32) -> Row {
        let f = fact! { "t" => table, "n" => n };
        Row::new(f.identity_in_order(), Arc::new(f))
    }

    fn removal(table: &str, rows: Vec<Row>) -> Changes {
        let mut changes = Changes::new();
        changes.insert(
            table.to_string(),
            TableChanges {
                adds: Vec::new(),
                removes: rows,
            },
        );
        changes
    }

    fn link(ledger: &mut ProvenanceLedger, view: &str, out: &Row, sources: &[(&str, &Row)]) {
        let instance = FactId::combine(sources.iter().map(|(_, r)| r.id()));
        for (table, source) in sources {
            ledger.record(ProvenanceRecord::new(view, out.id(), instance, *table, source.id()));
        }
    }

    #[test]
    fn test_removal_orphans_single_derivation() {
        let store = TableStore::new();
        let mut ledger = ProvenanceLedger::new();
        let (a, b, out) = (row("a", 1), row("b", 1), row("v", 1));
        link(&mut ledger, "v", &out, &[("a", &a), ("b", &b)]);

        let orphaned = retract(&mut ledger, &store, "v", &removal("a", vec![a]), false);
        assert_eq!(orphaned, vec![out.id()]);
        // Sibling record from table b went with the instance.
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_alternate_derivation_keeps_row() {
        let store = TableStore::new();
        let mut ledger = ProvenanceLedger::new();
        let (a1, a2, out) = (row("a", 1), row("a", 2), row("v", 1));
        link(&mut ledger, "v", &out, &[("a", &a1)]);
        link(&mut ledger, "v", &out, &[("a", &a2)]);

        let orphaned = retract(&mut ledger, &store, "v", &removal("a", vec![a1]), false);
        assert!(orphaned.is_empty());
        assert_eq!(ledger.instances_of("v", out.id()).len(), 1);
    }

    #[test]
    fn test_unrelated_view_untouched() {
        let store = TableStore::new();
        let mut ledger = ProvenanceLedger::new();
        let (a, out) = (row("a", 1), row("w", 1));
        link(&mut ledger, "w", &out, &[("a", &a)]);

        let orphaned = retract(&mut ledger, &store, "v", &removal("a", vec![a]), false);
        assert!(orphaned.is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_walk_drops_instance_on_unsupported_derived_row() {
        let mut store = TableStore::new();
        store.mark_view("d", true);
        let mut ledger = ProvenanceLedger::new();

        // `d1` is a derived row that has already lost its support.
        let (base, gone, d1, out) = (row("base", 1), row("base", 2), row("d", 1), row("v", 1));
        let d2 = row("d", 2);
        link(&mut ledger, "d", &d2, &[("base", &base)]);
        link(&mut ledger, "v", &out, &[("base", &gone)]);
        link(&mut ledger, "v", &out, &[("d", &d1)]);

        let changes = removal("base", vec![gone.clone()]);
        let kept = retract(&mut ledger, &store, "v", &changes, false);
        assert!(kept.is_empty());

        link(&mut ledger, "v", &out, &[("base", &gone)]);
        let orphaned = retract(&mut ledger, &store, "v", &changes, true);
        assert_eq!(orphaned, vec![out.id()]);

        // A derived row with support keeps the instance alive.
        link(&mut ledger, "d", &d1, &[("base", &base)]);
        link(&mut ledger, "v", &out, &[("base", &gone)]);
        link(&mut ledger, "v", &out, &[("d", &d1)]);
        let orphaned = retract(&mut ledger, &store, "v", &changes, true);
        assert!(orphaned.is_empty());
    }

    #[test]
    fn test_walk_rejects_support_only_through_cycle() {
        let mut store = TableStore::new();
        store.mark_view("d", true);
        let mut ledger = ProvenanceLedger::new();
        let (gone, d1, d2, out) = (row("base", 1), row("d", 1), row("d", 2), row("v", 1));
        link(&mut ledger, "d", &d1, &[("d", &d2)]);
        link(&mut ledger, "d", &d2, &[("d", &d1)]);
        link(&mut ledger, "v", &out, &[("base", &gone)]);
        link(&mut ledger, "v", &out, &[("d", &d1)]);

        let orphaned = retract(&mut ledger, &store, "v", &removal("base", vec![gone]), true);
        assert_eq!(orphaned, vec![out.id()]);
        assert!(ledger.instances_of("v", out.id()).is_empty());
    }

    #[test]
    fn test_walk_accepts_cycle_with_base_entry() {
        let mut store = TableStore::new();
        store.mark_view("d", true);
        let mut ledger = ProvenanceLedger::new();
        let (base, gone) = (row("base", 1), row("base", 2));
        let (d1, d2, out) = (row("d", 1), row("d", 2), row("v", 1));
        link(&mut ledger, "d", &d1, &[("d", &d2)]);
        link(&mut ledger, "d", &d2, &[("d", &d1)]);
        link(&mut ledger, "d", &d2, &[("base", &base)]);
        link(&mut ledger, "v", &out, &[("base", &gone)]);
        link(&mut ledger, "v", &out, &[("d", &d1), ("d", &d2)]);

        let orphaned = retract(&mut ledger, &store, "v", &removal("base", vec![gone]), true);
        assert!(orphaned.is_empty());
        assert_eq!(ledger.instances_of("v", out.id()).len(), 1);
    }

    #[test]
    fn test_cycle_through_own_view() {
        let mut store = TableStore::new();
        store.mark_view("v", true);
        let mut ledger = ProvenanceLedger::new();
        let (gone, v1, v2) = (row("base", 1), row("v", 1), row("v", 2));
        link(&mut ledger, "v", &v1, &[("base", &gone)]);
        link(&mut ledger, "v", &v1, &[("v", &v2)]);
        link(&mut ledger, "v", &v2, &[("v", &v1)]);

        let orphaned = retract(&mut ledger, &store, "v", &removal("base", vec![gone]), true);
        assert_eq!(orphaned, vec![v1.id()]);
    }
}
