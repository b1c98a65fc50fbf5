//! Real changes produced by applying a diff.
//!
//! `TableChanges` lists the rows that actually entered or left a table,
//! after duplicate adds and removes of absent facts were dropped.

use std::collections::BTreeMap;
use tessera_core::Row;

/// Per-table changes keyed by table name.
pub type Changes = BTreeMap<String, TableChanges>;

/// The rows that entered or left one table.
#[derive(Clone, Debug, Default)]
pub struct TableChanges {
    /// Rows that were added.
    pub adds: Vec<Row>,
    /// Rows that were removed.
    pub removes: Vec<Row>,
}

impl TableChanges {
    /// Creates an empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a change set of pure additions.
    pub fn added(rows: Vec<Row>) -> Self {
        Self {
            adds: rows,
            removes: Vec::new(),
        }
    }

    /// Returns true if nothing changed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    /// Returns the total number of changed rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.adds.len() + self.removes.len()
    }

    /// Appends another change set.
    pub fn merge(&mut self, other: TableChanges) {
        self.adds.extend(other.adds);
        self.removes.extend(other.removes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tessera_core::{fact, Row};

    fn row(n: i32) -> Row {
        let f = fact! { "n" => n };
        Row::new(f.identity_in_order(), Arc::new(f))
    }

    #[test]
    fn test_empty() {
        let changes = TableChanges::new();
        assert!(changes.is_empty());
        assert_eq!(changes.len(), 0);
    }

    #[test]
    fn test_merge() {
        let mut changes = TableChanges::added(vec![row(1)]);
        changes.merge(TableChanges {
            adds: vec![row(2)],
            removes: vec![row(3)],
        });
        assert_eq!(changes.adds.len(), 2);
        assert_eq!(changes.removes.len(), 1);
        assert_eq!(changes.len(), 3);
    }
}
