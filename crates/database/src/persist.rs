//! Persistence: dumping base tables to JSON and loading them back.
//!
//! Only base tables are written. View tables and custom trigger outputs are
//! derived and rebuilt when the facts are loaded; persisted views come back
//! through the catalog tables, which are base tables themselves.

use crate::database::Database;
use crate::scheduler::ApplyReport;
use std::collections::BTreeMap;
use tessera_core::{Fact, Result};
use tessera_storage::Diff;
use tracing::debug;

impl Database {
    /// Every base table and its facts, keyed by table name.
    pub fn dump(&self) -> BTreeMap<String, Vec<Fact>> {
        self.store
            .tables()
            .filter(|table| !table.is_view() && !self.is_custom_output(table.name()))
            .map(|table| {
                let facts = table.rows().iter().map(|row| row.fact().clone()).collect();
                (table.name().to_string(), facts)
            })
            .collect()
    }

    /// Serializes every base table as a JSON object `{table: [fact]}`.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.dump())?)
    }

    /// Loads serialized tables as one diff and propagates it.
    pub fn load(&mut self, serialized: &str) -> Result<ApplyReport> {
        let tables: BTreeMap<String, Vec<Fact>> = serde_json::from_str(serialized)?;
        let mut diff = Diff::new();
        for (table, facts) in tables {
            debug!(table = %table, facts = facts.len(), "loading table");
            diff.add_many(&table, facts);
        }
        self.apply(&diff)
    }
}
