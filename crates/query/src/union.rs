//! Set union of several tables.
//!
//! Each source maps fields of one table onto the union's output fields.
//! Output rows are identified by the output values in field order, so the
//! same row reached from two sources is emitted once and supported twice.

use crate::binding::Column;
use crate::executor::{self, QueryOutput};
use std::sync::Arc;
use tessera_core::{Error, Fact, FactId, Result, Row};
use tessera_incremental::{retract, settle, Delta, ProvenanceLedger, ProvenanceRecord};
use tessera_storage::{Changes, Schemas, TableChanges, TableStore};
use tracing::trace;

/// One source of a union.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionSource {
    pub table: String,
    /// Output field -> source column.
    pub mapping: Vec<(String, Column)>,
}

impl UnionSource {
    fn map(&self, row: &Row, fields: &[String]) -> Row {
        let mut fact = Fact::new();
        for (field, column) in &self.mapping {
            let value = match column {
                Column::Field(source) => row.get(source).cloned(),
                Column::Constant(value) => Some(value.clone()),
            };
            if let Some(value) = value {
                fact.insert(field.as_str(), value);
            }
        }
        Row::new(fact.identity(fields), Arc::new(fact))
    }

    fn provenance(&self, view: &str, output: FactId, source: &Row) -> ProvenanceRecord {
        let instance = FactId::combine([FactId::of_name(&self.table), source.id()]);
        ProvenanceRecord::new(view, output, instance, self.table.as_str(), source.id())
    }
}

/// A union of tables.
#[derive(Clone, Debug)]
pub struct Union {
    name: String,
    schemas: Schemas,
    sources: Vec<UnionSource>,
    fields: Vec<String>,
}

impl Union {
    /// Creates an empty union named after the view it defines.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schemas: Schemas::new(),
            sources: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Sets the table schemas source fields are validated against.
    pub fn with_schemas(mut self, schemas: Schemas) -> Self {
        self.schemas = schemas;
        self
    }

    /// Adds a source. The first source fixes the output fields; later
    /// sources must map exactly the same ones.
    pub fn union<I, K>(mut self, table: &str, mapping: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Column)>,
        K: Into<String>,
    {
        let mapping: Vec<(String, Column)> = mapping.into_iter().map(|(k, c)| (k.into(), c)).collect();
        if mapping.is_empty() {
            return Err(Error::missing_mapping("union"));
        }
        if let Some(fields) = self.schemas.get(table) {
            for (_, column) in &mapping {
                if let Column::Field(source) = column {
                    if !fields.contains(source) {
                        return Err(Error::unknown_field(table, source.as_str(), fields));
                    }
                }
            }
        }

        let keys: Vec<String> = mapping.iter().map(|(field, _)| field.clone()).collect();
        if self.sources.is_empty() {
            self.fields = keys;
        } else {
            let mut expected = self.fields.clone();
            let mut got = keys;
            expected.sort();
            got.sort();
            if expected != got {
                return Err(Error::invalid_view(
                    &self.name,
                    format!(
                        "source '{table}' maps {} but the union has {}",
                        got.join(", "),
                        expected.join(", ")
                    ),
                ));
            }
        }
        self.sources.push(UnionSource {
            table: table.to_string(),
            mapping,
        });
        Ok(self)
    }

    /// Returns the union (and view) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the sources in declaration order.
    pub fn sources(&self) -> &[UnionSource] {
        &self.sources
    }

    /// Output field names, in first-source order.
    pub fn output_fields(&self) -> Vec<String> {
        self.fields.clone()
    }

    /// Distinct source tables, in declaration order.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for source in &self.sources {
            if !tables.contains(&source.table) {
                tables.push(source.table.clone());
            }
        }
        tables
    }

    /// Maps every source row. The first source to produce an identity owns
    /// the output row; every mapped row is recorded as support.
    pub fn exec(&self, store: &TableStore) -> Result<QueryOutput> {
        if self.sources.is_empty() {
            return Err(Error::missing_mapping("union"));
        }
        let mut output = QueryOutput::default();
        let mut seen = hashbrown::HashSet::new();
        for source in &self.sources {
            let Some(table) = store.get(&source.table) else {
                continue;
            };
            for row in table.rows() {
                let mapped = source.map(row, &self.fields);
                output.provenance.push(source.provenance(&self.name, mapped.id(), row));
                if seen.insert(mapped.id()) {
                    output.results.push(mapped);
                }
            }
        }
        Ok(output)
    }

    /// Evaluates from scratch and diffs against the view table's contents,
    /// replacing the view's provenance.
    pub fn exec_full_delta(&self, store: &TableStore, ledger: &mut ProvenanceLedger) -> Result<TableChanges> {
        let output = self.exec(store)?;
        Ok(executor::full_delta(&self.name, output, store, ledger))
    }

    /// Maps only the added rows of `changes` and retracts rows whose every
    /// support was removed.
    pub fn exec_incremental(
        &self,
        store: &TableStore,
        ledger: &mut ProvenanceLedger,
        changes: &Changes,
    ) -> Result<TableChanges> {
        if self.sources.is_empty() {
            return Err(Error::missing_mapping("union"));
        }
        let mut deltas = Vec::new();
        let mut records = Vec::new();
        for source in &self.sources {
            let Some(table_changes) = changes.get(&source.table) else {
                continue;
            };
            for row in &table_changes.adds {
                let mapped = source.map(row, &self.fields);
                records.push(source.provenance(&self.name, mapped.id(), row));
                deltas.push(Delta::insert(mapped));
            }
        }

        let orphaned = retract(ledger, store, &self.name, changes, true);
        let prior = store.get(&self.name);
        let fresh: hashbrown::HashSet<FactId> = deltas.iter().map(|delta| delta.data.id()).collect();
        for id in orphaned {
            if fresh.contains(&id) {
                continue;
            }
            if let Some(row) = prior.and_then(|table| table.get(id)) {
                deltas.push(Delta::delete(row.clone()));
            }
        }
        let settled = settle(deltas, prior);
        ledger.record_all(records);
        trace!(
            view = %self.name,
            adds = settled.adds.len(),
            removes = settled.removes.len(),
            "union round"
        );
        Ok(settled)
    }
}
