//! End-to-end tests: views over base tables, recursive views, truth
//! maintenance, persistence and the view catalog.

use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_database::catalog;
use tessera_database::{fact, Database, DatabaseConfig, Fact, FactId, View};
use tessera_query::{Binding, Column, PrimitiveRegistry, Query, Union};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn database(incremental: bool) -> Database {
    init_tracing();
    let config = DatabaseConfig {
        incremental,
        ..DatabaseConfig::default()
    };
    Database::with_config(config, Arc::new(PrimitiveRegistry::new()))
}

fn none() -> Vec<(String, Binding)> {
    Vec::new()
}

fn ids(db: &Database, table: &str) -> BTreeSet<FactId> {
    db.table(table).map(|t| t.ids().collect()).unwrap_or_default()
}

fn column(db: &mut Database, table: &str, field: &str) -> BTreeSet<String> {
    db.find(table, &Fact::new())
        .iter()
        .filter_map(|row| row.get(field).map(|v| v.to_string()))
        .collect()
}

fn strings(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// ---------- Scenario A: join and truth maintenance ----------

fn scenario_a(db: &mut Database) {
    db.add_table("foo", ["a", "b"]);
    db.add_table("bar", ["a", "c"]);
    let view = db
        .query("v")
        .select("foo", none(), "f")
        .unwrap()
        .select("bar", [("a", Binding::field("f", "a"))], "r")
        .unwrap()
        .project([("c", Binding::field("r", "c"))])
        .unwrap();
    db.as_view(view).unwrap();

    let mut diff = db.diff();
    diff.add_many(
        "foo",
        vec![
            fact! { "a" => 1, "b" => 2 },
            fact! { "a" => 2, "b" => 3 },
            fact! { "a" => 2, "b" => 4 },
        ],
    )
    .add_many("bar", vec![fact! { "a" => 2, "c" => 5 }, fact! { "a" => 2, "c" => 6 }]);
    db.apply(&diff).unwrap();
}

#[test]
fn test_scenario_a() {
    for incremental in [false, true] {
        let mut db = database(incremental);
        scenario_a(&mut db);
        assert_eq!(column(&mut db, "v", "c"), strings(&["5", "6"]));

        let mut diff = db.diff();
        diff.remove_facts("foo", [fact! { "a" => 2, "b" => 3 }]);
        db.apply(&diff).unwrap();
        assert_eq!(column(&mut db, "v", "c"), strings(&["5", "6"]), "incremental: {incremental}");

        let mut diff = db.diff();
        diff.remove_facts("foo", [fact! { "a" => 2, "b" => 4 }]);
        db.apply(&diff).unwrap();
        assert!(column(&mut db, "v", "c").is_empty(), "incremental: {incremental}");
    }
}

// ---------- Scenario B: recursive views ----------

fn ancestor_views(db: &Database) -> (Union, Query) {
    let both = [("from", Column::field("from")), ("to", Column::field("to"))];
    let union = db
        .union("ancestor")
        .union("parent", both.clone())
        .unwrap()
        .union("ancestor step", both)
        .unwrap();
    let step = db
        .query("ancestor step")
        .select("parent", none(), "p")
        .unwrap()
        .select("ancestor", [("from", Binding::field("p", "to"))], "a")
        .unwrap()
        .project([("from", Binding::field("p", "from")), ("to", Binding::field("a", "to"))])
        .unwrap();
    (union, step)
}

fn pairs(db: &mut Database, table: &str) -> BTreeSet<(String, String)> {
    db.find(table, &Fact::new())
        .iter()
        .map(|row| {
            let get = |field| row.get(field).map(|v| v.to_string()).unwrap_or_default();
            (get("from"), get("to"))
        })
        .collect()
}

fn pair(from: &str, to: &str) -> (String, String) {
    (from.to_string(), to.to_string())
}

#[test]
fn test_scenario_b() {
    for incremental in [false, true] {
        let mut db = database(incremental);
        db.add_table("parent", ["from", "to"]);
        let (union, step) = ancestor_views(&db);
        db.as_view(union).unwrap();
        db.as_view(step).unwrap();

        let mut diff = db.diff();
        diff.add("parent", fact! { "from" => "a", "to" => "b" });
        db.apply(&diff).unwrap();
        let mut diff = db.diff();
        diff.add("parent", fact! { "from" => "b", "to" => "c" });
        db.apply(&diff).unwrap();

        let expected = BTreeSet::from([pair("a", "b"), pair("b", "c"), pair("a", "c")]);
        assert_eq!(pairs(&mut db, "ancestor"), expected, "incremental: {incremental}");

        // Cutting the chain removes the derived pair.
        let mut diff = db.diff();
        diff.remove_facts("parent", [fact! { "from" => "a", "to" => "b" }]);
        db.apply(&diff).unwrap();
        assert_eq!(pairs(&mut db, "ancestor"), BTreeSet::from([pair("b", "c")]));
    }
}

#[test]
fn test_cycle_does_not_keep_removed_reach_alive() {
    for incremental in [false, true] {
        let mut db = database(incremental);
        db.add_table("parent", ["from", "to"]);
        let (union, step) = ancestor_views(&db);
        db.as_view(union).unwrap();
        db.as_view(step).unwrap();

        let mut diff = db.diff();
        diff.add_many(
            "parent",
            vec![
                fact! { "from" => "a", "to" => "b" },
                fact! { "from" => "b", "to" => "a" },
                fact! { "from" => "a", "to" => "c" },
            ],
        );
        db.apply(&diff).unwrap();
        assert!(pairs(&mut db, "ancestor").contains(&pair("b", "c")));

        let mut diff = db.diff();
        diff.remove_facts("parent", [fact! { "from" => "a", "to" => "c" }]);
        db.apply(&diff).unwrap();
        let expected = BTreeSet::from([pair("a", "a"), pair("a", "b"), pair("b", "a"), pair("b", "b")]);
        assert_eq!(pairs(&mut db, "ancestor"), expected, "incremental: {incremental}");
        assert_eq!(
            pairs(&mut db, "ancestor step"),
            expected,
            "incremental: {incremental}"
        );
    }
}

// ---------- Properties ----------

#[test]
fn test_idempotent_add() {
    let mut db = database(true);
    scenario_a(&mut db);
    let before = ids(&db, "v");

    let mut diff = db.diff();
    diff.add("foo", fact! { "a" => 2, "b" => 3 });
    let report = db.apply(&diff).unwrap();
    assert!(report.changes.is_empty());
    assert_eq!(report.rounds, 0);
    assert_eq!(ids(&db, "v"), before);
}

#[test]
fn test_add_and_remove_cancel() {
    let mut db = database(false);
    scenario_a(&mut db);
    let facts = db.facts_per_table();

    let mut diff = db.diff();
    diff.add("foo", fact! { "a" => 9, "b" => 9 })
        .remove_facts("foo", [fact! { "a" => 9, "b" => 9 }]);
    let report = db.apply(&diff).unwrap();
    assert!(report.changes.is_empty());
    assert_eq!(db.facts_per_table(), facts);
}

#[test]
fn test_provenance_completeness() {
    for incremental in [false, true] {
        let mut db = database(incremental);
        db.add_table("left", ["n"]);
        db.add_table("right", ["n"]);
        let union = db
            .union("both")
            .union("left", [("n", Column::field("n"))])
            .unwrap()
            .union("right", [("n", Column::field("n"))])
            .unwrap();
        db.as_view(union).unwrap();

        let mut diff = db.diff();
        diff.add("left", fact! { "n" => 1 })
            .add("left", fact! { "n" => 2 })
            .add("right", fact! { "n" => 2 });
        db.apply(&diff).unwrap();
        assert_eq!(column(&mut db, "both", "n"), strings(&["1", "2"]));

        // Sole support removed.
        let mut diff = db.diff();
        diff.remove_facts("left", [fact! { "n" => 1 }]);
        db.apply(&diff).unwrap();
        assert_eq!(column(&mut db, "both", "n"), strings(&["2"]));

        // One of two independent supports removed.
        let mut diff = db.diff();
        diff.remove_facts("left", [fact! { "n" => 2 }]);
        db.apply(&diff).unwrap();
        assert_eq!(column(&mut db, "both", "n"), strings(&["2"]));

        // Both removed.
        let mut diff = db.diff();
        diff.remove_facts("right", [fact! { "n" => 2 }]);
        db.apply(&diff).unwrap();
        assert!(column(&mut db, "both", "n").is_empty());
    }
}

#[test]
fn test_projection_identity_is_stable() {
    let mut db = database(true);
    scenario_a(&mut db);
    let order = vec!["c".to_string()];
    let expected: BTreeSet<FactId> = [fact! { "c" => 5 }, fact! { "c" => 6 }]
        .iter()
        .map(|f| f.identity(&order))
        .collect();
    assert_eq!(ids(&db, "v"), expected);

    // Re-registering yields the same identities.
    let (name, view) = ("v", db.view("v").cloned().unwrap());
    assert!(db.remove_view(name));
    db.as_view(view).unwrap();
    assert_eq!(ids(&db, "v"), expected);
}

#[test]
fn test_full_and_incremental_agree_on_negation() {
    let mut results = Vec::new();
    for incremental in [false, true] {
        let mut db = database(incremental);
        db.add_table("person", ["name"]);
        db.add_table("banned", ["name"]);
        let allowed = db
            .query("allowed")
            .select("person", none(), "p")
            .unwrap()
            .deselect("banned", [("name", Binding::field("p", "name"))])
            .unwrap()
            .project([("name", Binding::field("p", "name"))])
            .unwrap();
        db.as_view(allowed).unwrap();

        let mut diff = db.diff();
        diff.add_many("person", vec![fact! { "name" => "ada" }, fact! { "name" => "kit" }])
            .add("banned", fact! { "name" => "kit" });
        db.apply(&diff).unwrap();
        let mut diff = db.diff();
        diff.remove_facts("banned", [fact! { "name" => "kit" }])
            .add("banned", fact! { "name" => "ada" });
        db.apply(&diff).unwrap();
        results.push(column(&mut db, "allowed", "name"));
    }
    assert_eq!(results[0], strings(&["kit"]));
    assert_eq!(results[0], results[1]);
}

// ---------- Persistence and catalog ----------

fn persisted_ancestors(incremental: bool) -> Database {
    let mut db = database(incremental);
    db.add_table("parent", ["from", "to"]);
    let (union, step) = ancestor_views(&db);
    db.persist_view(union).unwrap();
    db.persist_view(step).unwrap();

    let mut diff = db.diff();
    diff.add_many(
        "parent",
        vec![fact! { "from" => "a", "to" => "b" }, fact! { "from" => "b", "to" => "c" }],
    );
    db.apply(&diff).unwrap();
    db
}

#[test]
fn test_persisted_views_are_registered() {
    let mut db = persisted_ancestors(false);
    assert_eq!(db.view_names(), vec!["ancestor", "ancestor step"]);
    assert_eq!(pairs(&mut db, "ancestor").len(), 3);

    let compiled = db.compile_view("ancestor").unwrap();
    assert!(matches!(compiled, View::Union(_)));
    assert_eq!(compiled.output_fields(), vec!["from".to_string(), "to".to_string()]);
}

#[test]
fn test_serialize_and_load_round_trip() {
    for incremental in [false, true] {
        let db = persisted_ancestors(incremental);
        let serialized = db.serialize().unwrap();

        let mut restored = database(incremental);
        restored.load(&serialized).unwrap();
        assert_eq!(restored.view_names(), vec!["ancestor", "ancestor step"]);
        assert_eq!(ids(&restored, "ancestor"), ids(&db, "ancestor"));
        assert_eq!(ids(&restored, "parent"), ids(&db, "parent"));
        assert_eq!(restored.serialize().unwrap(), serialized);
    }
}

#[test]
fn test_remove_view_definition() {
    let mut db = persisted_ancestors(true);
    let removal = db.remove_view_definition("ancestor step");
    assert!(!removal.is_empty());
    db.apply(&removal).unwrap();

    assert!(db
        .find(catalog::ACTION, &fact! { "view" => "ancestor step" })
        .is_empty());
    assert!(db.compile_view("ancestor step").is_err());
    assert!(db.compile_view("ancestor").is_ok());
}

#[test]
fn test_broken_persisted_view_is_quarantined() {
    let mut db = database(false);
    let mut diff = db.diff();
    diff.add(catalog::VIEW, fact! { "view" => "broken", "kind" => "query" })
        .add(
            catalog::ACTION,
            fact! { "view" => "broken", "action" => "broken|0", "kind" => "calculate", "ix" => 0 },
        )
        .add(catalog::ACTION_SOURCE, fact! { "action" => "broken|0", "source view" => "no such primitive" });
    db.apply(&diff).unwrap();

    assert!(db.view("broken").is_none());
    assert!(db.find(catalog::VIEW, &Fact::new()).is_empty());
    assert!(db.find(catalog::ACTION, &Fact::new()).is_empty());
    assert!(db.find(catalog::ACTION_SOURCE, &Fact::new()).is_empty());
}

#[test]
fn test_catalog_only_views_of_kind_table_are_skipped() {
    let mut db = database(false);
    let mut diff = db.diff();
    diff.add(catalog::VIEW, fact! { "view" => "people", "kind" => "table" });
    db.apply(&diff).unwrap();
    assert!(db.view("people").is_none());
    assert_eq!(db.find(catalog::VIEW, &Fact::new()).len(), 1);
}
