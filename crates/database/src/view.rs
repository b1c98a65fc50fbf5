//! Views: queries and unions registered as live tables.

use crate::catalog;
use tessera_core::{Error, Result};
use tessera_incremental::ProvenanceLedger;
use tessera_query::{Query, Union};
use tessera_storage::{Changes, Diff, TableChanges, TableStore};

/// A view definition.
#[derive(Clone, Debug)]
pub enum View {
    Query(Query),
    Union(Union),
}

impl View {
    /// View (and output table) name.
    pub fn name(&self) -> &str {
        match self {
            View::Query(query) => query.name(),
            View::Union(union) => union.name(),
        }
    }

    /// Catalog kind: `query` or `union`.
    pub fn kind(&self) -> &'static str {
        match self {
            View::Query(_) => "query",
            View::Union(_) => "union",
        }
    }

    /// Source tables, in declaration order.
    pub fn tables(&self) -> Vec<String> {
        match self {
            View::Query(query) => query.tables(),
            View::Union(union) => union.tables(),
        }
    }

    /// Fields of the output table, in identity order.
    pub fn output_fields(&self) -> Vec<String> {
        match self {
            View::Query(query) => query.output_fields(),
            View::Union(union) => union.output_fields(),
        }
    }

    /// Reports definition errors before the view is registered.
    pub fn compile(&mut self) -> Result<()> {
        match self {
            View::Query(query) => query.compile(),
            View::Union(union) if union.sources().is_empty() => Err(Error::missing_mapping("union")),
            View::Union(_) => Ok(()),
        }
    }

    /// Describes the view as facts in the persisted view catalog.
    pub fn changeset(&self) -> Diff {
        catalog::changeset(self)
    }

    /// Full evaluation diffed against the output table.
    pub fn exec_full_delta(&mut self, store: &mut TableStore, ledger: &mut ProvenanceLedger) -> Result<TableChanges> {
        match self {
            View::Query(query) => query.exec_full_delta(store, ledger),
            View::Union(union) => union.exec_full_delta(store, ledger),
        }
    }

    /// Incremental evaluation from the previous round's changes.
    pub fn exec_incremental(
        &mut self,
        store: &mut TableStore,
        ledger: &mut ProvenanceLedger,
        changes: &Changes,
    ) -> Result<TableChanges> {
        match self {
            View::Query(query) => query.exec_incremental(store, ledger, changes),
            View::Union(union) => union.exec_incremental(store, ledger, changes),
        }
    }
}

impl From<Query> for View {
    fn from(query: Query) -> Self {
        View::Query(query)
    }
}

impl From<Union> for View {
    fn from(union: Union) -> Self {
        View::Union(union)
    }
}
