//! Trigger scheduling.
//!
//! Applying a diff owes the triggers registered on every table that really
//! changed. Owed triggers run in rounds: each round runs every owed trigger
//! once, applies its output and owes the triggers of the tables it changed.
//! Propagation stops at the first round that changes nothing.
//!
//! In full mode every view reachable from the owed triggers is emptied
//! first and re-evaluated from scratch; cleared views that no round reached
//! are resynced at the end. In incremental mode each trigger sees the
//! changes of the previous round.

use crate::catalog;
use crate::database::Database;
use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_core::{Error, Fact, Result, Value};
use tessera_reactive::TriggerAction;
use tessera_storage::{Changes, DiffOutcome, TableChanges, TableStore};
use tracing::{debug, error, trace};

/// Summary of one propagation.
#[derive(Clone, Debug, Default)]
pub struct ApplyReport {
    /// Trigger rounds run.
    pub rounds: usize,
    /// Trigger executions across all rounds.
    pub triggers_run: usize,
    /// Real changes of the diff that started propagation.
    pub changes: Changes,
}

/// Applies a view's computed changes to its table.
pub(crate) fn apply_changes(store: &mut TableStore, table: &str, changes: &TableChanges) -> TableChanges {
    if changes.is_empty() {
        return TableChanges::new();
    }
    let adds: Vec<Arc<Fact>> = changes.adds.iter().map(|row| row.shared().clone()).collect();
    let removes: Vec<Arc<Fact>> = changes.removes.iter().map(|row| row.shared().clone()).collect();
    store.update_table(table, &adds, &removes)
}

impl Database {
    /// Runs owed triggers until no table changes.
    pub(crate) fn propagate(&mut self, outcome: DiffOutcome, incremental: bool) -> Result<ApplyReport> {
        let DiffOutcome { triggers, changes } = outcome;
        let mut report = ApplyReport {
            changes: changes.clone(),
            ..ApplyReport::default()
        };
        let cleared = if incremental {
            BTreeSet::new()
        } else {
            self.store.clear_reachable_views(&triggers)
        };

        let mut owed = triggers;
        let mut round_changes = changes;
        let mut ran: BTreeSet<String> = BTreeSet::new();
        loop {
            if owed.is_empty() {
                owed = cleared
                    .iter()
                    .filter(|name| !ran.contains(*name) && self.triggers.contains(name))
                    .cloned()
                    .collect();
                if owed.is_empty() {
                    break;
                }
                trace!(views = owed.len(), "resyncing cleared views");
            }

            report.rounds += 1;
            if let Some(max) = self.config.max_rounds {
                if report.rounds > max {
                    return Err(Error::RoundLimit { rounds: max });
                }
            }
            debug!(round = report.rounds, triggers = owed.len(), incremental, "trigger round");

            let mut next_owed = BTreeSet::new();
            let mut next_changes = Changes::new();
            for name in &owed {
                ran.insert(name.clone());
                let produced = self.run_trigger(name, &round_changes, incremental)?;
                report.triggers_run += 1;
                for (table, table_changes) in produced {
                    if table_changes.is_empty() {
                        continue;
                    }
                    if let Some(t) = self.store.get(&table) {
                        next_owed.extend(t.triggers().iter().cloned());
                    }
                    next_changes.entry(table).or_default().merge(table_changes);
                }
            }
            owed = next_owed;
            round_changes = next_changes;
        }
        Ok(report)
    }

    /// Runs one trigger and applies its output. Returns the real changes.
    fn run_trigger(&mut self, name: &str, changes: &Changes, incremental: bool) -> Result<Changes> {
        let Some(kind) = self.triggers.get(name).map(|trigger| trigger.action().kind()) else {
            return Ok(Changes::new());
        };
        trace!(trigger = name, kind, "running trigger");

        let applied = match kind {
            "recompile" => return self.recompile(),
            "view" => {
                let Some(view) = self.views.get_mut(name) else {
                    return Ok(Changes::new());
                };
                let delta = if incremental {
                    view.exec_incremental(&mut self.store, &mut self.ledger, changes)?
                } else {
                    view.exec_full_delta(&mut self.store, &mut self.ledger)?
                };
                apply_changes(&mut self.store, name, &delta)
            }
            _ => self.run_custom(name, changes, incremental),
        };

        let mut out = Changes::new();
        if !applied.is_empty() {
            out.insert(name.to_string(), applied);
        }
        Ok(out)
    }

    /// Custom triggers fill the table of the same name. Without an
    /// incremental callback the full output replaces the table's content.
    fn run_custom(&mut self, name: &str, changes: &Changes, incremental: bool) -> TableChanges {
        let Some(TriggerAction::Custom(custom)) = self.triggers.get_mut(name).map(|t| t.action_mut()) else {
            return TableChanges::new();
        };

        if incremental && custom.is_incremental() {
            let Some(delta) = custom.exec_incremental(&self.store, changes) else {
                return TableChanges::new();
            };
            let adds: Vec<Arc<Fact>> = delta.adds.into_iter().map(Arc::new).collect();
            let removes: Vec<Arc<Fact>> = delta.removes.into_iter().map(Arc::new).collect();
            return self.store.update_table(name, &adds, &removes);
        }

        let Some(facts) = custom.exec(&self.store) else {
            return TableChanges::new();
        };
        let adds: Vec<Arc<Fact>> = facts.into_iter().map(Arc::new).collect();
        let removes: Vec<Arc<Fact>> = self
            .store
            .get(name)
            .map(|table| table.rows().iter().map(|row| row.shared().clone()).collect())
            .unwrap_or_default();
        self.store.update_table(name, &adds, &removes)
    }

    /// Recompiles every persisted view from the catalog. A view that fails
    /// is quarantined: logged, deregistered and its catalog facts removed.
    fn recompile(&mut self) -> Result<Changes> {
        let ids: Vec<String> = self
            .store
            .lookup(catalog::VIEW, &Fact::new())
            .iter()
            .filter(|row| row.get("kind").and_then(Value::as_str) != Some("table"))
            .filter_map(|row| row.get("view").and_then(Value::as_str).map(str::to_string))
            .collect();

        let mut changes = Changes::new();
        for id in ids {
            match self.install_persisted(&id) {
                Ok(applied) => {
                    if !applied.is_empty() {
                        changes.insert(id, applied);
                    }
                }
                Err(err) => {
                    error!(view = %id, error = %err, "quarantining persisted view");
                    self.remove_view(&id);
                    let removal = catalog::removal(&self.store, &id);
                    // Applied without propagation: the removal owes this
                    // trigger again.
                    self.store.exec_diff(&removal);
                }
            }
        }
        Ok(changes)
    }

    fn install_persisted(&mut self, id: &str) -> Result<TableChanges> {
        let mut view = catalog::compile(&self.store, self.registry.clone(), id)?;
        view.compile()?;
        self.register_view(view);
        self.refresh_view(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseConfig;
    use tessera_core::fact;
    use tessera_query::{Binding, Column, PrimitiveRegistry};
    use tessera_reactive::TriggerDelta;

    fn chain(db: &mut Database, depth: usize) {
        db.add_table("t0", ["n"]);
        for i in 1..=depth {
            let union = db
                .union(&format!("t{i}"))
                .union(&format!("t{}", i - 1), [("n", Column::field("n"))])
                .unwrap();
            db.as_view(union).unwrap();
        }
    }

    #[test]
    fn test_acyclic_chain_settles_in_depth_rounds() {
        for incremental in [false, true] {
            let mut db = Database::with_config(
                DatabaseConfig {
                    incremental,
                    ..DatabaseConfig::default()
                },
                Arc::new(PrimitiveRegistry::new()),
            );
            chain(&mut db, 4);
            let mut diff = db.diff();
            diff.add("t0", fact! { "n" => 1 });
            let report = db.apply(&diff).unwrap();
            assert!(report.rounds <= 4, "took {} rounds", report.rounds);
            assert_eq!(db.find("t4", &fact! {}).len(), 1);
        }
    }

    #[test]
    fn test_round_limit() {
        let mut db = Database::with_config(DatabaseConfig::default().with_max_rounds(2), Arc::new(PrimitiveRegistry::new()));
        chain(&mut db, 4);
        let mut diff = db.diff();
        diff.add("t0", fact! { "n" => 1 });
        let err = db.apply(&diff).unwrap_err();
        assert!(matches!(err, Error::RoundLimit { rounds: 2 }));
    }

    #[test]
    fn test_no_triggers_no_rounds() {
        let mut db = Database::new();
        let mut diff = db.diff();
        diff.add("lonely", fact! { "n" => 1 });
        let report = db.apply(&diff).unwrap();
        assert_eq!(report.rounds, 0);
        assert_eq!(report.changes["lonely"].adds.len(), 1);
    }

    #[test]
    fn test_full_mode_resyncs_cleared_views() {
        // `both` reads `a` through the view `a_copy` and `b` directly. When
        // `a_copy` ends up empty nothing retriggers `both`, which must still
        // be resynced after being cleared.
        let mut db = Database::new();
        db.add_table("a", ["n"]);
        db.add_table("b", ["n"]);
        let copy = db.union("a_copy").union("a", [("n", Column::field("n"))]).unwrap();
        db.as_view(copy).unwrap();
        let both = db
            .union("both")
            .union("a_copy", [("n", Column::field("n"))])
            .unwrap()
            .union("b", [("n", Column::field("n"))])
            .unwrap();
        db.as_view(both).unwrap();

        let mut diff = db.diff();
        diff.add("b", fact! { "n" => 2 });
        db.apply(&diff).unwrap();

        let mut diff = db.diff();
        diff.add("a", fact! { "n" => 1 });
        db.apply(&diff).unwrap();
        assert_eq!(db.find("both", &fact! {}).len(), 2);

        let mut diff = db.diff();
        diff.remove(db.store(), "a", &fact! {});
        db.apply(&diff).unwrap();
        assert_eq!(db.find("both", &fact! {}).len(), 1);
    }

    #[test]
    fn test_custom_trigger_full_output_is_diffed() {
        let mut db = Database::new();
        db.add_table("person", ["name"]);
        db.trigger(
            "shout",
            vec!["person".into()],
            Box::new(|store: &TableStore| -> Option<Vec<Fact>> {
                let rows = store.get("person")?.rows().to_vec();
                Some(
                    rows.iter()
                        .filter_map(|row| row.get("name").and_then(Value::as_str))
                        .map(|name| fact! { "name" => name.to_uppercase() })
                        .collect(),
                )
            }),
            None,
        );

        let mut diff = db.diff();
        diff.add("person", fact! { "name" => "ada" })
            .add("person", fact! { "name" => "kit" });
        db.apply(&diff).unwrap();
        assert_eq!(db.find("shout", &fact! {}).len(), 2);

        // Incremental mode falls back to the full callback.
        let mut diff = db.diff();
        diff.remove(db.store(), "person", &fact! { "name" => "kit" });
        db.apply_diff_incremental(&diff).unwrap();
        assert_eq!(db.find("shout", &fact! {}).len(), 1);
        assert!(db.find_one("shout", &fact! { "name" => "ADA" }).is_some());
    }

    #[test]
    fn test_custom_trigger_incremental_callback() {
        let mut db = Database::with_config(DatabaseConfig::incremental(), Arc::new(PrimitiveRegistry::new()));
        db.add_table("n", ["v"]);
        db.trigger(
            "double",
            vec!["n".into()],
            Box::new(|_: &TableStore| None),
            Some(Box::new(|_: &TableStore, changes: &Changes| -> Option<TriggerDelta> {
                let doubled = |row: &tessera_core::Row| {
                    let v = row.get("v").and_then(Value::as_number).unwrap_or(0.0);
                    fact! { "v" => v * 2.0 }
                };
                let n = changes.get("n")?;
                Some(TriggerDelta {
                    adds: n.adds.iter().map(doubled).collect(),
                    removes: n.removes.iter().map(doubled).collect(),
                })
            })),
        );

        let mut diff = db.diff();
        diff.add_many("n", vec![fact! { "v" => 1 }, fact! { "v" => 2 }]);
        db.apply(&diff).unwrap();
        assert!(db.find_one("double", &fact! { "v" => 4 }).is_some());

        let mut diff = db.diff();
        diff.remove(db.store(), "n", &fact! { "v" => 2 });
        db.apply(&diff).unwrap();
        assert_eq!(db.find("double", &fact! {}).len(), 1);
    }

    #[test]
    fn test_views_feed_queries() {
        let mut db = Database::with_config(DatabaseConfig::incremental(), Arc::new(PrimitiveRegistry::new()));
        db.add_table("score", ["player", "points"]);
        let total = db
            .query("total")
            .select("score", Vec::<(String, Binding)>::new(), "s")
            .unwrap()
            .aggregate("sum", [("value", Binding::field("s", "points"))], "sum")
            .unwrap()
            .group([("s", "player")])
            .unwrap()
            .project([("player", Binding::field("s", "player")), ("total", Binding::field("sum", "sum"))])
            .unwrap();
        db.as_view(total).unwrap();

        let mut diff = db.diff();
        diff.add_many(
            "score",
            vec![
                fact! { "player" => "a", "points" => 1 },
                fact! { "player" => "a", "points" => 2 },
            ],
        );
        db.apply(&diff).unwrap();
        assert!(db.find_one("total", &fact! { "player" => "a", "total" => 3 }).is_some());

        let mut diff = db.diff();
        diff.remove(db.store(), "score", &fact! { "points" => 2 });
        db.apply(&diff).unwrap();
        let rows = db.find("total", &fact! {});
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("total"), Some(&Value::from(1)));
    }
}
