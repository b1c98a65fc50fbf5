//! Staged batches of fact changes.
//!
//! A `Diff` collects adds and removes across tables before they are applied
//! to a [`TableStore`]. Pattern removes are resolved against the store at
//! staging time, so the diff only ever carries concrete facts.

use crate::store::TableStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::Fact;

/// Adds and removes staged for one table.
#[derive(Clone, Debug, Default)]
pub struct TableDiff {
    /// Facts to add.
    pub adds: Vec<Arc<Fact>>,
    /// Facts to remove.
    pub removes: Vec<Arc<Fact>>,
}

impl TableDiff {
    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    /// Returns the number of staged facts.
    pub fn len(&self) -> usize {
        self.adds.len() + self.removes.len()
    }
}

/// A batch of adds and removes keyed by table.
#[derive(Clone, Debug, Default)]
pub struct Diff {
    tables: BTreeMap<String, TableDiff>,
}

impl Diff {
    /// Creates an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, table: &str) -> &mut TableDiff {
        self.tables.entry(table.to_string()).or_default()
    }

    /// Stages one fact to add.
    pub fn add(&mut self, table: &str, fact: Fact) -> &mut Self {
        self.entry(table).adds.push(Arc::new(fact));
        self
    }

    /// Stages several facts to add.
    pub fn add_many<I>(&mut self, table: &str, facts: I) -> &mut Self
    where
        I: IntoIterator<Item = Fact>,
    {
        self.entry(table).adds.extend(facts.into_iter().map(Arc::new));
        self
    }

    /// Stages already shared facts to add.
    pub fn add_shared<I>(&mut self, table: &str, facts: I) -> &mut Self
    where
        I: IntoIterator<Item = Arc<Fact>>,
    {
        self.entry(table).adds.extend(facts);
        self
    }

    /// Stages removal of every fact currently stored in `table` that matches
    /// `pattern`.
    pub fn remove(&mut self, store: &TableStore, table: &str, pattern: &Fact) -> &mut Self {
        let matched = store.lookup(table, pattern);
        self.entry(table)
            .removes
            .extend(matched.iter().map(|row| row.shared().clone()));
        self
    }

    /// Stages removal of explicit facts.
    pub fn remove_facts<I>(&mut self, table: &str, facts: I) -> &mut Self
    where
        I: IntoIterator<Item = Fact>,
    {
        self.entry(table).removes.extend(facts.into_iter().map(Arc::new));
        self
    }

    /// Stages removal of already shared facts.
    pub fn remove_shared<I>(&mut self, table: &str, facts: I) -> &mut Self
    where
        I: IntoIterator<Item = Arc<Fact>>,
    {
        self.entry(table).removes.extend(facts);
        self
    }

    /// Appends another diff's adds and removes.
    pub fn merge(&mut self, other: &Diff) -> &mut Self {
        for (table, staged) in &other.tables {
            let entry = self.entry(table);
            entry.adds.extend(staged.adds.iter().cloned());
            entry.removes.extend(staged.removes.iter().cloned());
        }
        self
    }

    /// Returns a diff with adds and removes swapped.
    pub fn reverse(&self) -> Diff {
        let tables = self
            .tables
            .iter()
            .map(|(table, staged)| {
                let flipped = TableDiff {
                    adds: staged.removes.clone(),
                    removes: staged.adds.clone(),
                };
                (table.clone(), flipped)
            })
            .collect();
        Diff { tables }
    }

    /// Returns the staged changes for one table.
    pub fn get(&self, table: &str) -> Option<&TableDiff> {
        self.tables.get(table)
    }

    /// Iterates over staged tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableDiff)> {
        self.tables.iter().map(|(name, staged)| (name.as_str(), staged))
    }

    /// Returns the total number of staged facts.
    pub fn len(&self) -> usize {
        self.tables.values().map(TableDiff::len).sum()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(TableDiff::is_empty)
    }
}
