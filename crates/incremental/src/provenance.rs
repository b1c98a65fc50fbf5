//! Provenance records and the ledger that indexes them.

use hashbrown::HashMap;
use std::collections::BTreeSet;
use tessera_core::FactId;
use tessera_index::HashIndex;

/// Links one output row of a view to one source row through a row instance.
///
/// A row instance with `n` sources is stored as `n` records sharing the same
/// `row_instance`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenanceRecord {
    /// The view that produced the row.
    pub view: String,
    /// Identity of the output row.
    pub row: FactId,
    /// Identity of the derivation.
    pub row_instance: FactId,
    /// Table the source row lives in.
    pub source: String,
    /// Identity of the source row.
    pub source_row: FactId,
}

impl ProvenanceRecord {
    /// Creates a provenance record.
    pub fn new(
        view: impl Into<String>,
        row: FactId,
        row_instance: FactId,
        source: impl Into<String>,
        source_row: FactId,
    ) -> Self {
        Self {
            view: view.into(),
            row,
            row_instance,
            source: source.into(),
            source_row,
        }
    }

    /// Identity of the record itself.
    pub fn id(&self) -> FactId {
        FactId::combine([
            FactId::of_name(&self.view),
            self.row,
            self.row_instance,
            FactId::of_name(&self.source),
            self.source_row,
        ])
    }
}

/// Indexed collection of provenance records across all views.
///
/// Records are looked up three ways: by source row (to find what a removal
/// invalidates), by row instance (to drop a whole derivation) and by output
/// row (to see what still supports it).
#[derive(Debug, Default)]
pub struct ProvenanceLedger {
    records: HashMap<FactId, ProvenanceRecord>,
    by_view: HashIndex<String>,
    by_source: HashIndex<(String, String, FactId)>,
    by_instance: HashIndex<(String, FactId)>,
    by_row: HashIndex<(String, FactId)>,
}

impl ProvenanceLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of records held for one view.
    pub fn view_len(&self, view: &str) -> usize {
        self.by_view.get(&view.to_string()).len()
    }

    /// Adds a record. Returns false if an identical record exists.
    pub fn record(&mut self, record: ProvenanceRecord) -> bool {
        let id = record.id();
        if self.records.contains_key(&id) {
            return false;
        }
        self.by_view.add(record.view.clone(), id);
        self.by_source.add(
            (record.view.clone(), record.source.clone(), record.source_row),
            id,
        );
        self.by_instance.add((record.view.clone(), record.row_instance), id);
        self.by_row.add((record.view.clone(), record.row), id);
        self.records.insert(id, record);
        true
    }

    /// Adds many records. Returns how many were new.
    pub fn record_all<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = ProvenanceRecord>,
    {
        let mut added = 0;
        for record in records {
            if self.record(record) {
                added += 1;
            }
        }
        added
    }

    fn remove(&mut self, id: FactId) -> Option<ProvenanceRecord> {
        let record = self.records.remove(&id)?;
        self.by_view.remove(id);
        self.by_source.remove(id);
        self.by_instance.remove(id);
        self.by_row.remove(id);
        Some(record)
    }

    fn resolve(&self, ids: &[FactId]) -> Vec<&ProvenanceRecord> {
        ids.iter().filter_map(|id| self.records.get(id)).collect()
    }

    /// Records whose source is the given row of the given table.
    pub fn by_source(&self, view: &str, source: &str, source_row: FactId) -> Vec<&ProvenanceRecord> {
        let key = (view.to_string(), source.to_string(), source_row);
        self.resolve(self.by_source.get(&key))
    }

    /// Records that make up one row instance.
    pub fn instance(&self, view: &str, row_instance: FactId) -> Vec<&ProvenanceRecord> {
        self.resolve(self.by_instance.get(&(view.to_string(), row_instance)))
    }

    /// Records supporting an output row.
    pub fn supports(&self, view: &str, row: FactId) -> Vec<&ProvenanceRecord> {
        self.resolve(self.by_row.get(&(view.to_string(), row)))
    }

    /// Distinct row instances supporting an output row.
    pub fn instances_of(&self, view: &str, row: FactId) -> BTreeSet<FactId> {
        self.supports(view, row)
            .into_iter()
            .map(|record| record.row_instance)
            .collect()
    }

    /// Removes every record of a row instance and returns them.
    pub fn remove_instance(&mut self, view: &str, row_instance: FactId) -> Vec<ProvenanceRecord> {
        let ids = self
            .by_instance
            .get(&(view.to_string(), row_instance))
            .to_vec();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Removes every record of a view. Returns how many were removed.
    pub fn clear_view(&mut self, view: &str) -> usize {
        let ids = self.by_view.get(&view.to_string()).to_vec();
        ids.into_iter().filter(|id| self.remove(*id).is_some()).count()
    }

    /// Replaces a view's records wholesale.
    pub fn replace_view<I>(&mut self, view: &str, records: I)
    where
        I: IntoIterator<Item = ProvenanceRecord>,
    {
        self.clear_view(view);
        self.record_all(records);
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.by_view.clear();
        self.by_source.clear();
        self.by_instance.clear();
        self.by_row.clear();
    }
}
