//! Fact storage for a single table.
//!
//! A `Table` holds a set of facts keyed by identity. Field indexes are built
//! on first lookup over a field combination and kept current on every update.

use crate::changes::TableChanges;
use hashbrown::HashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tessera_core::{Fact, FactId, Row, Value};
use tessera_index::HashIndex;
use tracing::trace;

/// Index over a sorted combination of fields.
#[derive(Debug, Clone)]
pub struct FieldIndex {
    fields: Vec<String>,
    inner: HashIndex<Vec<Value>>,
}

impl FieldIndex {
    fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            inner: HashIndex::new(),
        }
    }

    /// Returns the indexed fields, sorted.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the number of indexed facts.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of lookups served.
    pub fn lookups(&self) -> usize {
        self.inner.stats().lookups()
    }

    fn key_of(&self, fact: &Fact) -> Option<Vec<Value>> {
        self.fields
            .iter()
            .map(|field| fact.get(field).cloned())
            .collect()
    }

    fn insert(&mut self, row: &Row) {
        if let Some(key) = self.key_of(row.fact()) {
            self.inner.add(key, row.id());
        }
    }

    fn remove(&mut self, id: FactId) {
        self.inner.remove(id);
    }

    fn get(&self, key: &Vec<Value>) -> &[FactId] {
        self.inner.get(key)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }
}

/// A set of facts with identity-based deduplication.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    /// Declared field order; identity is computed over it.
    fields: Vec<String>,
    rows: Vec<Row>,
    positions: HashMap<FactId, usize>,
    /// Indexes keyed by their `|`-joined sorted field names.
    indexes: BTreeMap<String, FieldIndex>,
    /// Names of the triggers owed when this table changes.
    triggers: BTreeSet<String>,
    is_view: bool,
}

impl Table {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
            rows: Vec::new(),
            positions: HashMap::new(),
            indexes: BTreeMap::new(),
            triggers: BTreeSet::new(),
            is_view: false,
        }
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared fields. Empty until declared or inferred.
    #[inline]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns true if the table is the output of a view.
    #[inline]
    pub fn is_view(&self) -> bool {
        self.is_view
    }

    pub(crate) fn set_view(&mut self, is_view: bool) {
        self.is_view = is_view;
    }

    /// Returns the number of stored facts.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no facts are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns every stored row.
    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Iterates over the identities of stored rows.
    pub fn ids(&self) -> impl Iterator<Item = FactId> + '_ {
        self.rows.iter().map(Row::id)
    }

    /// Returns true if a fact with this identity is stored.
    #[inline]
    pub fn contains(&self, id: FactId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Returns the stored row with this identity.
    pub fn get(&self, id: FactId) -> Option<&Row> {
        self.positions.get(&id).map(|&pos| &self.rows[pos])
    }

    /// Returns the names of triggers registered on this table.
    pub fn triggers(&self) -> &BTreeSet<String> {
        &self.triggers
    }

    pub(crate) fn add_trigger(&mut self, name: &str) {
        self.triggers.insert(name.to_string());
    }

    pub(crate) fn remove_trigger(&mut self, name: &str) -> bool {
        self.triggers.remove(name)
    }

    /// Returns the index over the given fields, if one was built.
    pub fn field_index(&self, fields: &[&str]) -> Option<&FieldIndex> {
        let (name, _) = index_name(fields.iter().map(|f| f.to_string()).collect());
        self.indexes.get(&name)
    }

    /// Returns the number of built indexes.
    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    /// Computes the identity a fact has in this table.
    pub fn identity(&self, fact: &Fact) -> FactId {
        if self.fields.is_empty() {
            fact.identity_in_order()
        } else {
            fact.identity(&self.fields)
        }
    }

    /// Declares the field order. Stored facts are re-keyed if it changes.
    pub fn declare_fields(&mut self, fields: &[String]) {
        if fields.is_empty() || self.fields == fields {
            return;
        }
        self.fields = fields.to_vec();
        if !self.rows.is_empty() {
            self.rekey();
        }
    }

    fn rekey(&mut self) {
        let facts: Vec<Arc<Fact>> = self.rows.iter().map(|row| row.shared().clone()).collect();
        self.clear();
        for fact in facts {
            let id = self.identity(&fact);
            if !self.positions.contains_key(&id) {
                self.push(Row::new(id, fact));
            }
        }
    }

    /// Applies adds and removes with net-count semantics.
    ///
    /// A fact added and removed in the same batch cancels out. Adding a
    /// stored fact or removing an absent one is a no-op. Returns the rows
    /// that actually changed.
    pub fn update(&mut self, adds: &[Arc<Fact>], removes: &[Arc<Fact>]) -> TableChanges {
        if self.fields.is_empty() {
            if let Some(first) = adds.first() {
                self.fields = first.field_names();
            }
        }

        let mut order: Vec<FactId> = Vec::with_capacity(adds.len() + removes.len());
        let mut counts: HashMap<FactId, (i64, &Arc<Fact>)> = HashMap::new();
        let staged = adds.iter().map(|f| (f, 1)).chain(removes.iter().map(|f| (f, -1)));
        for (fact, delta) in staged {
            let id = self.identity(fact);
            let entry = counts.entry(id).or_insert_with(|| {
                order.push(id);
                (0, fact)
            });
            entry.0 += delta;
        }

        let mut changes = TableChanges::new();
        for id in order {
            let (count, fact) = counts[&id];
            if count > 0 && !self.positions.contains_key(&id) {
                let row = Row::new(id, fact.clone());
                self.push(row.clone());
                changes.adds.push(row);
            } else if count < 0 {
                if let Some(row) = self.swap_remove(id) {
                    changes.removes.push(row);
                }
            }
        }
        changes
    }

    fn push(&mut self, row: Row) {
        for index in self.indexes.values_mut() {
            index.insert(&row);
        }
        self.positions.insert(row.id(), self.rows.len());
        self.rows.push(row);
    }

    fn swap_remove(&mut self, id: FactId) -> Option<Row> {
        let pos = self.positions.remove(&id)?;
        let row = self.rows.swap_remove(pos);
        if let Some(moved) = self.rows.get(pos) {
            self.positions.insert(moved.id(), pos);
        }
        for index in self.indexes.values_mut() {
            index.remove(id);
        }
        Some(row)
    }

    /// Removes every stored fact. Built indexes are kept, emptied.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.positions.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    /// Builds an index over the given fields if it does not exist yet.
    pub fn ensure_index(&mut self, fields: Vec<String>) -> &FieldIndex {
        let (name, fields) = index_name(fields);
        if !self.indexes.contains_key(&name) {
            trace!(table = %self.name, index = %name, rows = self.rows.len(), "building index");
            let mut index = FieldIndex::new(fields);
            for row in &self.rows {
                index.insert(row);
            }
            self.indexes.insert(name.clone(), index);
        }
        &self.indexes[&name]
    }

    /// Finds every fact matching the pattern, building an index over the
    /// pattern's fields on first use.
    pub fn find(&mut self, pattern: &Fact) -> Vec<Row> {
        if pattern.is_empty() {
            return self.rows.clone();
        }
        self.ensure_index(pattern.field_names());
        self.lookup(pattern)
    }

    /// Finds every fact matching the pattern without building indexes.
    ///
    /// Uses an existing index over exactly the pattern's fields, otherwise
    /// scans.
    pub fn lookup(&self, pattern: &Fact) -> Vec<Row> {
        if pattern.is_empty() {
            return self.rows.clone();
        }
        let (name, fields) = index_name(pattern.field_names());
        match self.indexes.get(&name) {
            Some(index) => {
                let key: Option<Vec<Value>> = fields.iter().map(|f| pattern.get(f).cloned()).collect();
                let Some(key) = key else {
                    return Vec::new();
                };
                index
                    .get(&key)
                    .iter()
                    .filter_map(|id| self.get(*id).cloned())
                    .collect()
            }
            None => self
                .rows
                .iter()
                .filter(|row| row.fact().matches(pattern))
                .cloned()
                .collect(),
        }
    }
}

fn index_name(mut fields: Vec<String>) -> (String, Vec<String>) {
    fields.sort();
    fields.dedup();
    (fields.join("|"), fields)
}
