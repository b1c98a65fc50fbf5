//! Database - main entry point for Tessera.
//!
//! The `Database` owns the table store, the provenance ledger, the registered
//! views and the triggers that keep them up to date.

use crate::catalog;
use crate::config::DatabaseConfig;
use crate::scheduler::{apply_changes, ApplyReport};
use crate::view::View;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{Error, Fact, Result, Row};
use tessera_incremental::ProvenanceLedger;
use tessera_query::{PrimitiveRegistry, Query, Union};
use tessera_reactive::{ExecFn, IncrementalFn, Trigger, TriggerAction, TriggerRegistry};
use tessera_storage::{Changes, Diff, DiffOutcome, Table, TableChanges, TableStore};
use tracing::debug;

/// An in-memory fact store with incrementally maintained views.
///
/// Provides methods for:
/// - Declaring tables and reading facts
/// - Registering queries and unions as views
/// - Applying diffs and propagating them through triggers
/// - Persisting views as catalog facts
///
/// # Example
///
/// ```rust
/// use tessera_core::fact;
/// use tessera_database::Database;
/// use tessera_query::Binding;
///
/// let mut db = Database::new();
/// db.add_table("person", ["name", "age"]);
///
/// let adults = db
///     .query("adult")
///     .select("person", Vec::<(String, Binding)>::new(), "p").unwrap()
///     .calculate(">=", [("a", Binding::field("p", "age")), ("b", Binding::constant(18))], "check").unwrap()
///     .project([("name", Binding::field("p", "name"))]).unwrap();
/// db.as_view(adults).unwrap();
///
/// let mut diff = db.diff();
/// diff.add("person", fact! { "name" => "ada", "age" => 36 })
///     .add("person", fact! { "name" => "kit", "age" => 9 });
/// db.apply(&diff).unwrap();
///
/// assert_eq!(db.find("adult", &fact! {}).len(), 1);
/// ```
pub struct Database {
    pub(crate) config: DatabaseConfig,
    pub(crate) registry: Arc<PrimitiveRegistry>,
    pub(crate) store: TableStore,
    pub(crate) ledger: ProvenanceLedger,
    pub(crate) views: HashMap<String, View>,
    pub(crate) triggers: TriggerRegistry,
}

impl Database {
    /// Creates a database with the default configuration and the builtin
    /// primitives.
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default(), Arc::new(PrimitiveRegistry::new()))
    }

    /// Creates a database with an explicit configuration and primitive
    /// registry.
    pub fn with_config(config: DatabaseConfig, registry: Arc<PrimitiveRegistry>) -> Self {
        let mut db = Self {
            config,
            registry,
            store: TableStore::new(),
            ledger: ProvenanceLedger::new(),
            views: HashMap::new(),
            triggers: TriggerRegistry::new(),
        };
        db.install_catalog();
        db
    }

    fn install_catalog(&mut self) {
        if !self.config.persisted_views {
            return;
        }
        for (name, fields) in catalog::TABLES {
            let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
            self.store.add_table(name, &fields);
        }
        let tables = catalog::table_names();
        self.store.register_trigger(catalog::RECOMPILE, &tables);
        self.triggers
            .register(Trigger::new(catalog::RECOMPILE, tables, TriggerAction::Recompile));
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PrimitiveRegistry> {
        &self.registry
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn ledger(&self) -> &ProvenanceLedger {
        &self.ledger
    }

    // ========== Tables ==========

    /// Declares a table and its field order. Existing facts are kept.
    pub fn add_table<I, S>(&mut self, name: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.store.add_table(name, &fields);
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.store.get(name)
    }

    /// Builds an index over the given fields of a table.
    pub fn index(&mut self, table: &str, fields: &[&str]) {
        self.store.index(table, fields);
    }

    /// Facts matching a pattern. An empty pattern matches every fact; an
    /// unknown table yields nothing.
    pub fn find(&mut self, table: &str, pattern: &Fact) -> Vec<Row> {
        self.store.find(table, pattern)
    }

    pub fn find_one(&mut self, table: &str, pattern: &Fact) -> Option<Row> {
        self.store.find_one(table, pattern)
    }

    /// Starts an empty diff.
    pub fn diff(&self) -> Diff {
        Diff::new()
    }

    /// Starts a query validated against the current table schemas.
    pub fn query(&self, name: &str) -> Query {
        Query::new(name, self.registry.clone()).with_schemas(self.store.schemas())
    }

    /// Starts a union validated against the current table schemas.
    pub fn union(&self, name: &str) -> Union {
        Union::new(name).with_schemas(self.store.schemas())
    }

    // ========== Views ==========

    /// Registers a query or union as a view, fills its table and propagates
    /// the result to dependent triggers.
    pub fn as_view(&mut self, view: impl Into<View>) -> Result<ApplyReport> {
        let mut view = view.into();
        view.compile()?;
        let name = view.name().to_string();
        self.register_view(view);
        let applied = match self.refresh_view(&name) {
            Ok(applied) => applied,
            Err(err) => {
                self.remove_view(&name);
                return Err(err);
            }
        };
        debug!(view = %name, rows = self.store.get(&name).map_or(0, Table::len), "registered view");
        if applied.is_empty() {
            return Ok(ApplyReport::default());
        }

        let triggers = self
            .store
            .get(&name)
            .map(|table| table.triggers().clone())
            .unwrap_or_default();
        let mut changes = Changes::new();
        changes.insert(name, applied);
        let incremental = self.config.incremental;
        self.propagate(DiffOutcome { triggers, changes }, incremental)
    }

    pub(crate) fn register_view(&mut self, view: View) {
        let name = view.name().to_string();
        let tables = view.tables();
        self.unregister(&name);
        self.store.add_table(&name, &view.output_fields());
        self.store.mark_view(&name, true);
        self.store.register_trigger(&name, &tables);
        self.triggers.register(Trigger::view(name.as_str(), tables));
        self.views.insert(name, view);
    }

    /// Re-evaluates a registered view from scratch and applies the result to
    /// its table.
    pub(crate) fn refresh_view(&mut self, name: &str) -> Result<TableChanges> {
        let view = self
            .views
            .get_mut(name)
            .ok_or_else(|| Error::view_not_found(name))?;
        let delta = view.exec_full_delta(&mut self.store, &mut self.ledger)?;
        Ok(apply_changes(&mut self.store, name, &delta))
    }

    fn unregister(&mut self, name: &str) -> bool {
        self.store.unregister_trigger(name);
        self.views.remove(name);
        self.triggers.unregister(name).is_some()
    }

    /// Removes a view or custom trigger and empties its table. Dependents
    /// are left as they are until their sources change again.
    pub fn remove_view(&mut self, name: &str) -> bool {
        if name == catalog::RECOMPILE || !self.unregister(name) {
            return false;
        }
        self.ledger.clear_view(name);
        self.store.clear_table(name);
        self.store.mark_view(name, false);
        debug!(view = name, "removed view");
        true
    }

    /// Removes every view and custom trigger. Persisted view definitions
    /// stay in the catalog.
    pub fn clear_all_views(&mut self) {
        let names: Vec<String> = self
            .triggers
            .names()
            .into_iter()
            .filter(|name| *name != catalog::RECOMPILE)
            .map(str::to_string)
            .collect();
        for name in names {
            self.remove_view(&name);
        }
    }

    /// Returns a registered view.
    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    /// Names of the registered views, sorted.
    pub fn view_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.views.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Writes a view into the catalog. With persisted views enabled the
    /// recompile trigger then registers it.
    pub fn persist_view(&mut self, view: impl Into<View>) -> Result<ApplyReport> {
        let mut view = view.into();
        view.compile()?;
        let diff = view.changeset();
        self.apply(&diff)
    }

    /// Rebuilds a view from its catalog facts.
    pub fn compile_view(&self, view_id: &str) -> Result<View> {
        catalog::compile(&self.store, self.registry.clone(), view_id)
    }

    /// Builds the diff removing a view's catalog facts.
    pub fn remove_view_definition(&self, view_id: &str) -> Diff {
        catalog::removal(&self.store, view_id)
    }

    // ========== Triggers ==========

    /// Registers user callbacks that fill the table `name` from `tables`.
    ///
    /// `exec` returns the table's complete new content; `exec_incremental`,
    /// if given, returns adds and removes from the previous round's changes.
    /// Callbacks return their output and never apply diffs themselves.
    pub fn trigger(&mut self, name: &str, tables: Vec<String>, exec: ExecFn, exec_incremental: Option<IncrementalFn>) {
        self.unregister(name);
        self.store.table_mut(name);
        self.store.mark_view(name, false);
        self.store.register_trigger(name, &tables);
        self.triggers
            .register(Trigger::custom(name, tables, exec, exec_incremental));
    }

    pub(crate) fn is_custom_output(&self, table: &str) -> bool {
        self.triggers
            .get(table)
            .is_some_and(|trigger| matches!(trigger.action(), TriggerAction::Custom(_)))
    }

    // ========== Applying diffs ==========

    /// Applies a diff in the configured maintenance mode.
    pub fn apply(&mut self, diff: &Diff) -> Result<ApplyReport> {
        if self.config.incremental {
            self.apply_diff_incremental(diff)
        } else {
            self.apply_diff(diff)
        }
    }

    /// Applies a diff, then re-evaluates every affected view from scratch.
    pub fn apply_diff(&mut self, diff: &Diff) -> Result<ApplyReport> {
        let outcome = self.store.exec_diff(diff);
        self.propagate(outcome, false)
    }

    /// Applies a diff, then maintains affected views from per-round deltas.
    pub fn apply_diff_incremental(&mut self, diff: &Diff) -> Result<ApplyReport> {
        let outcome = self.store.exec_diff(diff);
        self.propagate(outcome, true)
    }

    // ========== Housekeeping ==========

    /// Removes every fact of a table and propagates the removal.
    pub fn clear_table(&mut self, name: &str) -> Result<ApplyReport> {
        let mut diff = Diff::new();
        diff.remove(&self.store, name, &Fact::new());
        self.apply(&diff)
    }

    /// Drops every table, view and trigger.
    pub fn delete_db(&mut self) {
        self.store = TableStore::new();
        self.ledger.clear();
        self.views.clear();
        self.triggers.clear();
        self.install_catalog();
        debug!("deleted database");
    }

    pub fn total_facts(&self) -> usize {
        self.store.total_facts()
    }

    pub fn facts_per_table(&self) -> BTreeMap<String, usize> {
        self.store.facts_per_table()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("tables", &self.store.table_names())
            .field("views", &self.view_names())
            .field("triggers", &self.triggers.names())
            .finish()
    }
}
