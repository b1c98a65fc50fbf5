//! Wire diffs: `{table, fields, adds, removes}` records exchanged with
//! remote peers.
//!
//! Facts travel either as objects or as positional value arrays read
//! against `fields` (or the table's declared fields when `fields` is
//! empty). A positional fact whose length does not match the field list is
//! accepted: values are paired with fields up to the shorter of the two and
//! the mismatch is logged.

use crate::database::Database;
use crate::scheduler::ApplyReport;
use serde::{Deserialize, Serialize};
use tessera_core::{Error, Fact, Result, Value};
use tessera_storage::{Changes, Diff, TableStore};
use tracing::warn;

/// One fact on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireFact {
    Positional(Vec<Value>),
    Object(Fact),
}

/// Changes to one table, as exchanged on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WireDiff {
    pub table: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub adds: Vec<WireFact>,
    #[serde(default)]
    pub removes: Vec<WireFact>,
}

/// Parses a JSON array of wire diffs.
pub fn parse_wire(json: &str) -> Result<Vec<WireDiff>> {
    Ok(serde_json::from_str(json)?)
}

/// Encodes wire diffs as a JSON array.
pub fn to_wire_json(diffs: &[WireDiff]) -> Result<String> {
    Ok(serde_json::to_string(diffs)?)
}

impl WireDiff {
    /// Encodes real changes. Facts carrying every declared field of their
    /// table are sent positionally, the rest as objects.
    pub fn from_changes(changes: &Changes, store: &TableStore) -> Vec<WireDiff> {
        changes
            .iter()
            .filter(|(_, table_changes)| !table_changes.is_empty())
            .map(|(table, table_changes)| {
                let fields = store.get(table).map(|t| t.fields().to_vec()).unwrap_or_default();
                let encode = |fact: &Fact| positional(fact, &fields).unwrap_or_else(|| WireFact::Object(fact.clone()));
                WireDiff {
                    table: table.clone(),
                    adds: table_changes.adds.iter().map(|row| encode(row.fact())).collect(),
                    removes: table_changes.removes.iter().map(|row| encode(row.fact())).collect(),
                    fields,
                }
            })
            .collect()
    }

    fn decode(&self, fact: &WireFact, fields: &[String]) -> Result<Fact> {
        match fact {
            WireFact::Object(fact) => {
                if !fields.is_empty() && fact.len() != fields.len() {
                    warn!(
                        table = %self.table,
                        expected = fields.len(),
                        got = fact.len(),
                        "wire fact field count mismatch"
                    );
                }
                Ok(fact.clone())
            }
            WireFact::Positional(values) => {
                if fields.is_empty() {
                    return Err(Error::wire(format!(
                        "positional fact for table '{}' without fields",
                        self.table
                    )));
                }
                if values.len() != fields.len() {
                    warn!(
                        table = %self.table,
                        expected = fields.len(),
                        got = values.len(),
                        "wire fact field count mismatch"
                    );
                }
                Ok(fields.iter().cloned().zip(values.iter().cloned()).collect())
            }
        }
    }
}

fn positional(fact: &Fact, fields: &[String]) -> Option<WireFact> {
    if fields.is_empty() || fact.len() != fields.len() {
        return None;
    }
    fields
        .iter()
        .map(|field| fact.get(field).cloned())
        .collect::<Option<Vec<Value>>>()
        .map(WireFact::Positional)
}

impl Database {
    /// Applies wire diffs as one diff. Fields sent for a table without
    /// declared fields become its declared fields.
    pub fn apply_wire(&mut self, diffs: &[WireDiff]) -> Result<ApplyReport> {
        let mut diff = Diff::new();
        for wire in diffs {
            let declared = self.store.get(&wire.table).map(|t| t.fields().to_vec()).unwrap_or_default();
            let fields = if wire.fields.is_empty() {
                declared
            } else {
                if declared.is_empty() {
                    self.store.add_table(&wire.table, &wire.fields);
                } else if declared.len() != wire.fields.len() {
                    warn!(
                        table = %wire.table,
                        expected = declared.len(),
                        got = wire.fields.len(),
                        "wire diff field count mismatch"
                    );
                }
                wire.fields.clone()
            };

            let adds = wire
                .adds
                .iter()
                .map(|fact| wire.decode(fact, &fields))
                .collect::<Result<Vec<Fact>>>()?;
            let removes = wire
                .removes
                .iter()
                .map(|fact| wire.decode(fact, &fields))
                .collect::<Result<Vec<Fact>>>()?;
            diff.add_many(&wire.table, adds).remove_facts(&wire.table, removes);
        }
        self.apply(&diff)
    }

    /// Parses and applies a JSON array of wire diffs.
    pub fn apply_wire_json(&mut self, json: &str) -> Result<ApplyReport> {
        let diffs = parse_wire(json)?;
        self.apply_wire(&diffs)
    }
}
