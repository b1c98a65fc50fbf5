//! Multi-table store for Tessera.
//!
//! `TableStore` owns every table, applies diffs and reports which triggers a
//! diff owes. Tables are created on first touch.

use crate::changes::{Changes, TableChanges};
use crate::diff::Diff;
use crate::table::Table;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tessera_core::{Fact, Row};
use tracing::debug;

/// Declared field lists keyed by table name.
pub type Schemas = BTreeMap<String, Vec<String>>;

/// What applying a diff did.
#[derive(Debug, Default)]
pub struct DiffOutcome {
    /// Triggers registered on tables that really changed.
    pub triggers: BTreeSet<String>,
    /// Real changes per table. Tables with no net change are omitted.
    pub changes: Changes,
}

/// Collection of named tables.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: BTreeMap<String, Table>,
}

impl TableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table, or declares fields on an existing one.
    pub fn add_table(&mut self, name: &str, fields: &[String]) -> &mut Table {
        let table = self.table_mut(name);
        table.declare_fields(fields);
        table
    }

    /// Returns a table, creating it empty if missing.
    pub fn table_mut(&mut self, name: &str) -> &mut Table {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(name, Vec::new()))
    }

    /// Returns a table if it exists.
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Returns true if the table exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Iterates over every table in name order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Returns all table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Returns the declared fields of every table that has them.
    pub fn schemas(&self) -> Schemas {
        self.tables
            .iter()
            .filter(|(_, table)| !table.fields().is_empty())
            .map(|(name, table)| (name.clone(), table.fields().to_vec()))
            .collect()
    }

    /// Finds facts matching a pattern, building an index on first use.
    pub fn find(&mut self, table: &str, pattern: &Fact) -> Vec<Row> {
        match self.tables.get_mut(table) {
            Some(t) => t.find(pattern),
            None => Vec::new(),
        }
    }

    /// Finds the first fact matching a pattern.
    pub fn find_one(&mut self, table: &str, pattern: &Fact) -> Option<Row> {
        self.find(table, pattern).into_iter().next()
    }

    /// Finds facts matching a pattern without building indexes.
    pub fn lookup(&self, table: &str, pattern: &Fact) -> Vec<Row> {
        match self.tables.get(table) {
            Some(t) => t.lookup(pattern),
            None => Vec::new(),
        }
    }

    /// Builds an index over the given fields of a table.
    pub fn index(&mut self, table: &str, fields: &[&str]) {
        let fields = fields.iter().map(|f| f.to_string()).collect();
        self.table_mut(table).ensure_index(fields);
    }

    /// Applies adds and removes to one table.
    pub fn update_table(&mut self, table: &str, adds: &[Arc<Fact>], removes: &[Arc<Fact>]) -> TableChanges {
        self.table_mut(table).update(adds, removes)
    }

    /// Applies a diff and collects the triggers it owes.
    pub fn exec_diff(&mut self, diff: &Diff) -> DiffOutcome {
        let mut outcome = DiffOutcome::default();
        for (name, staged) in diff.tables() {
            if staged.is_empty() {
                continue;
            }
            let table = self.table_mut(name);
            let changes = table.update(&staged.adds, &staged.removes);
            if changes.is_empty() {
                continue;
            }
            debug!(
                table = name,
                adds = changes.adds.len(),
                removes = changes.removes.len(),
                "applied table diff"
            );
            outcome.triggers.extend(table.triggers().iter().cloned());
            outcome.changes.insert(name.to_string(), changes);
        }
        outcome
    }

    /// Empties a table, keeping its fields, indexes and triggers.
    pub fn clear_table(&mut self, name: &str) {
        if let Some(table) = self.tables.get_mut(name) {
            table.clear();
        }
    }

    /// Empties every view table reachable from the given triggers through
    /// trigger edges. Returns the names of the cleared views.
    pub fn clear_reachable_views(&mut self, start: &BTreeSet<String>) -> BTreeSet<String> {
        let mut cleared = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack: Vec<String> = start.iter().cloned().collect();
        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(table) = self.tables.get_mut(&name) else {
                continue;
            };
            if table.is_view() {
                table.clear();
                cleared.insert(name.clone());
            }
            stack.extend(table.triggers().iter().cloned());
        }
        cleared
    }

    /// Registers a trigger on each of the given tables.
    pub fn register_trigger(&mut self, trigger: &str, tables: &[String]) {
        for table in tables {
            self.table_mut(table).add_trigger(trigger);
        }
    }

    /// Removes a trigger from every table.
    pub fn unregister_trigger(&mut self, trigger: &str) {
        for table in self.tables.values_mut() {
            table.remove_trigger(trigger);
        }
    }

    /// Marks a table as a view output or a base table.
    pub fn mark_view(&mut self, name: &str, is_view: bool) {
        self.table_mut(name).set_view(is_view);
    }

    /// Returns the number of facts across all tables.
    pub fn total_facts(&self) -> usize {
        self.tables.values().map(Table::len).sum()
    }

    /// Returns the number of facts in each table.
    pub fn facts_per_table(&self) -> BTreeMap<String, usize> {
        self.tables
            .iter()
            .map(|(name, table)| (name.clone(), table.len()))
            .collect()
    }

    /// Empties every table.
    pub fn clear_all(&mut self) {
        for table in self.tables.values_mut() {
            table.clear();
        }
    }
}
