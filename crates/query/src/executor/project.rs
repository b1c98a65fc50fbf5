//! Project executor.

use crate::plan::{Arg, Slot};
use std::sync::Arc;
use tessera_core::{Fact, Row};

/// Project executor - builds an output row from a finished tuple.
pub(crate) struct ProjectExecutor<'p> {
    projection: Option<&'p [(String, Arg)]>,
    output_fields: &'p [String],
}

impl<'p> ProjectExecutor<'p> {
    /// Creates a new project executor.
    pub(crate) fn new(projection: Option<&'p [(String, Arg)]>, output_fields: &'p [String]) -> Self {
        Self {
            projection,
            output_fields,
        }
    }

    /// Projects the tuple. Unbound values are left out of the fact; the
    /// identity still accounts for them. Returns `None` without a
    /// projection.
    pub(crate) fn execute(&self, tuple: &[Slot]) -> Option<Row> {
        let projection = self.projection?;
        let mut fact = Fact::new();
        for (field, arg) in projection {
            if let Some(value) = arg.resolve(tuple) {
                fact.insert(field.as_str(), value.clone());
            }
        }
        let id = fact.identity(self.output_fields);
        Some(Row::new(id, Arc::new(fact)))
    }
}
