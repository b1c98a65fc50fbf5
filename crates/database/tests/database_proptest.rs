//! Property-based tests for view maintenance through the scheduler.
//!
//! A database maintaining its views incrementally must hold exactly the
//! rows of a database that re-evaluates them from scratch, for a join view
//! and for a recursive union over graphs with cycles and self-loops.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_database::{fact, Database, DatabaseConfig, Fact, FactId};
use tessera_query::{Binding, Column, PrimitiveRegistry};

/// (add?, from, to)
type Op = (bool, i32, i32);

fn op_strategy() -> impl Strategy<Value = Op> {
    (any::<bool>(), 0i32..5, 0i32..5)
}

fn batches_strategy() -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(prop::collection::vec(op_strategy(), 1..5), 1..10)
}

fn edge(op: &Op) -> Fact {
    let (_, from, to) = *op;
    fact! { "from" => from, "to" => to }
}

fn database(incremental: bool) -> Database {
    let config = DatabaseConfig {
        incremental,
        ..DatabaseConfig::default()
    };
    let mut db = Database::with_config(config, Arc::new(PrimitiveRegistry::new()));
    db.add_table("parent", ["from", "to"]);

    let both = [("from", Column::field("from")), ("to", Column::field("to"))];
    let ancestor = db
        .union("ancestor")
        .union("parent", both.clone())
        .unwrap()
        .union("ancestor step", both)
        .unwrap();
    let step = db
        .query("ancestor step")
        .select("parent", Vec::<(String, Binding)>::new(), "p")
        .unwrap()
        .select("ancestor", [("from", Binding::field("p", "to"))], "a")
        .unwrap()
        .project([("from", Binding::field("p", "from")), ("to", Binding::field("a", "to"))])
        .unwrap();
    let two_hop = db
        .query("two hop")
        .select("parent", Vec::<(String, Binding)>::new(), "x")
        .unwrap()
        .select("parent", [("from", Binding::field("x", "to"))], "y")
        .unwrap()
        .project([("from", Binding::field("x", "from")), ("to", Binding::field("y", "to"))])
        .unwrap();
    db.as_view(ancestor).unwrap();
    db.as_view(step).unwrap();
    db.as_view(two_hop).unwrap();
    db
}

fn ids(db: &Database, table: &str) -> BTreeSet<FactId> {
    db.table(table).map(|t| t.ids().collect()).unwrap_or_default()
}

proptest! {
    /// Property: incremental maintenance converges to full re-evaluation.
    #[test]
    fn incremental_equals_full(batches in batches_strategy()) {
        let mut full = database(false);
        let mut incremental = database(true);

        for batch in &batches {
            let mut diff = full.diff();
            for op in batch {
                if op.0 {
                    diff.add("parent", edge(op));
                } else {
                    diff.remove_facts("parent", [edge(op)]);
                }
            }
            full.apply(&diff).unwrap();
            incremental.apply(&diff).unwrap();

            for view in ["ancestor", "ancestor step", "two hop"] {
                prop_assert_eq!(ids(&incremental, view), ids(&full, view), "view {}", view);
            }
        }
    }

    /// Property: the ancestor view is the transitive closure of `parent`.
    #[test]
    fn ancestor_is_transitive_closure(batches in batches_strategy()) {
        let mut db = database(true);
        for batch in &batches {
            let mut diff = db.diff();
            for op in batch {
                if op.0 {
                    diff.add("parent", edge(op));
                } else {
                    diff.remove_facts("parent", [edge(op)]);
                }
            }
            db.apply(&diff).unwrap();
        }

        let edges: BTreeSet<(i64, i64)> = db
            .find("parent", &Fact::new())
            .iter()
            .filter_map(|row| {
                let from = row.get("from")?.as_number()? as i64;
                let to = row.get("to")?.as_number()? as i64;
                Some((from, to))
            })
            .collect();
        let mut closure = edges.clone();
        loop {
            let next: BTreeSet<(i64, i64)> = closure
                .iter()
                .flat_map(|&(a, b)| edges.iter().filter(move |&&(c, _)| c == b).map(move |&(_, d)| (a, d)))
                .collect();
            let before = closure.len();
            closure.extend(next);
            if closure.len() == before {
                break;
            }
        }

        let expected: BTreeSet<FactId> = closure
            .iter()
            .map(|&(a, b)| {
                let order = vec!["from".to_string(), "to".to_string()];
                let pair = fact! { "from" => a as i32, "to" => b as i32 };
                pair.identity(&order)
            })
            .collect();
        prop_assert_eq!(ids(&db, "ancestor"), expected);
    }
}
