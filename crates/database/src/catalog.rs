//! Persisted view catalog.
//!
//! Views can be stored as facts in a handful of catalog tables and rebuilt
//! from them. Every step of a view is an *action* with a position (`ix`);
//! the action id doubles as the alias other actions refer to.
//!
//! | table | fields |
//! |---|---|
//! | `view` | view, kind |
//! | `action` | view, action, kind, ix |
//! | `action source` | action, source view |
//! | `action mapping` | action, from, to source, to field |
//! | `action mapping constant` | action, from, value |
//! | `action mapping sorted` | action, ix, source, field, direction |
//! | `action mapping limit` | action, limit type, value |

use crate::view::View;
use hashbrown::HashMap;
use std::sync::Arc;
use tessera_core::{fact, Error, Fact, Result, Row, Value};
use tessera_query::{Binding, Column, Direction, Limit, PrimitiveRegistry, Query, SortKey, Step, Union};
use tessera_storage::{Diff, TableStore};

pub const VIEW: &str = "view";
pub const ACTION: &str = "action";
pub const ACTION_SOURCE: &str = "action source";
pub const ACTION_MAPPING: &str = "action mapping";
pub const ACTION_MAPPING_CONSTANT: &str = "action mapping constant";
pub const ACTION_MAPPING_SORTED: &str = "action mapping sorted";
pub const ACTION_MAPPING_LIMIT: &str = "action mapping limit";

/// Name of the trigger that recompiles persisted views.
pub const RECOMPILE: &str = "recompile";

/// Catalog tables and their fields.
pub const TABLES: [(&str, &[&str]); 7] = [
    (VIEW, &["view", "kind"]),
    (ACTION, &["view", "action", "kind", "ix"]),
    (ACTION_SOURCE, &["action", "source view"]),
    (ACTION_MAPPING, &["action", "from", "to source", "to field"]),
    (ACTION_MAPPING_CONSTANT, &["action", "from", "value"]),
    (ACTION_MAPPING_SORTED, &["action", "ix", "source", "field", "direction"]),
    (ACTION_MAPPING_LIMIT, &["action", "limit type", "value"]),
];

/// Names of the catalog tables.
pub fn table_names() -> Vec<String> {
    TABLES.iter().map(|(name, _)| name.to_string()).collect()
}

/// Describes a view as catalog facts.
pub fn changeset(view: &View) -> Diff {
    let mut diff = Diff::new();
    match view {
        View::Query(query) => query_changeset(query, &mut diff),
        View::Union(union) => union_changeset(union, &mut diff),
    }
    diff
}

struct Writer<'a> {
    view: &'a str,
    diff: &'a mut Diff,
    ix: usize,
    /// Query alias -> action id
    aliases: HashMap<String, String>,
}

impl<'a> Writer<'a> {
    fn action(&mut self, kind: &str) -> String {
        let action = format!("{}|{}", self.view, self.ix);
        self.diff.add(
            ACTION,
            fact! { "view" => self.view, "action" => action.as_str(), "kind" => kind, "ix" => self.ix },
        );
        self.ix += 1;
        action
    }

    fn source(&mut self, action: &str, source: &str) {
        self.diff
            .add(ACTION_SOURCE, fact! { "action" => action, "source view" => source });
    }

    fn alias(&self, alias: &str) -> String {
        self.aliases.get(alias).cloned().unwrap_or_else(|| alias.to_string())
    }

    fn mapping(&mut self, action: &str, mapping: &[(String, Binding)]) {
        for (from, binding) in mapping {
            match binding {
                Binding::Field { alias, field } => {
                    let source = self.alias(alias);
                    self.diff.add(
                        ACTION_MAPPING,
                        fact! {
                            "action" => action,
                            "from" => from.as_str(),
                            "to source" => source,
                            "to field" => field.as_str(),
                        },
                    );
                }
                Binding::Constant(value) => {
                    self.diff.add(
                        ACTION_MAPPING_CONSTANT,
                        fact! { "action" => action, "from" => from.as_str(), "value" => value.clone() },
                    );
                }
            }
        }
    }

    fn sorted(&mut self, action: &str, keys: &[SortKey]) {
        for (ix, key) in keys.iter().enumerate() {
            let source = self.alias(&key.alias);
            self.diff.add(
                ACTION_MAPPING_SORTED,
                fact! {
                    "action" => action,
                    "ix" => ix,
                    "source" => source,
                    "field" => key.field.as_str(),
                    "direction" => key.direction.as_str(),
                },
            );
        }
    }
}

fn query_changeset(query: &Query, diff: &mut Diff) {
    diff.add(VIEW, fact! { "view" => query.name(), "kind" => "query" });
    let mut w = Writer {
        view: query.name(),
        diff,
        ix: 0,
        aliases: HashMap::new(),
    };

    for step in query.steps() {
        match step {
            Step::Select { alias, table, mapping } => {
                let action = w.action("select");
                w.source(&action, table);
                w.mapping(&action, mapping);
                w.aliases.insert(alias.clone(), action);
            }
            Step::Deselect { table, mapping } => {
                let action = w.action("deselect");
                w.source(&action, table);
                w.mapping(&action, mapping);
            }
            Step::Calculate { alias, primitive, args } => {
                let action = w.action("calculate");
                w.source(&action, primitive);
                w.mapping(&action, args);
                w.aliases.insert(alias.clone(), action);
            }
        }
    }
    for aggregate in query.aggregates() {
        let action = w.action("aggregate");
        w.source(&action, &aggregate.primitive);
        w.mapping(&action, &aggregate.args);
        w.aliases.insert(aggregate.alias.clone(), action);
    }
    if !query.groups().is_empty() {
        let action = w.action("group");
        w.sorted(&action, query.groups());
    }
    if !query.sorts().is_empty() {
        let action = w.action("sort");
        w.sorted(&action, query.sorts());
    }
    if let Some(limit) = query.limit_clause() {
        let action = w.action("limit");
        let parts = [
            ("results", limit.results),
            ("perGroup", limit.per_group),
            ("offset", limit.offset),
        ];
        for (kind, value) in parts {
            if let Some(value) = value {
                w.diff.add(
                    ACTION_MAPPING_LIMIT,
                    fact! { "action" => action.as_str(), "limit type" => kind, "value" => value },
                );
            }
        }
    }
    if let Some(alias) = query.ordinal_alias() {
        let action = w.action("ordinal");
        w.aliases.insert(alias.to_string(), action);
    }
    if let Some(projection) = query.projection() {
        let action = w.action("project");
        w.mapping(&action, projection);
    }
}

fn union_changeset(union: &Union, diff: &mut Diff) {
    diff.add(VIEW, fact! { "view" => union.name(), "kind" => "union" });
    let mut w = Writer {
        view: union.name(),
        diff,
        ix: 0,
        aliases: HashMap::new(),
    };
    for source in union.sources() {
        let action = w.action("union");
        w.source(&action, &source.table);
        for (from, column) in &source.mapping {
            match column {
                Column::Field(field) => {
                    w.diff.add(
                        ACTION_MAPPING,
                        fact! {
                            "action" => action.as_str(),
                            "from" => from.as_str(),
                            "to source" => source.table.as_str(),
                            "to field" => field.as_str(),
                        },
                    );
                }
                Column::Constant(value) => {
                    w.diff.add(
                        ACTION_MAPPING_CONSTANT,
                        fact! { "action" => action.as_str(), "from" => from.as_str(), "value" => value.clone() },
                    );
                }
            }
        }
    }
}

/// Builds the diff that removes every catalog fact of a view.
pub fn removal(store: &TableStore, view: &str) -> Diff {
    let mut diff = Diff::new();
    diff.remove(store, VIEW, &fact! { "view" => view });
    for action in store.lookup(ACTION, &fact! { "view" => view }) {
        let Some(id) = action.get("action") else {
            continue;
        };
        let by_action = Fact::new().with("action", id.clone());
        diff.remove_shared(ACTION, [action.shared().clone()]);
        for table in [
            ACTION_SOURCE,
            ACTION_MAPPING,
            ACTION_MAPPING_CONSTANT,
            ACTION_MAPPING_SORTED,
            ACTION_MAPPING_LIMIT,
        ] {
            diff.remove(store, table, &by_action);
        }
    }
    diff
}

fn text<'r>(row: &'r Row, field: &str, view: &str) -> Result<&'r str> {
    row.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_view(view, format!("catalog fact is missing '{field}'")))
}

fn count(value: Option<&Value>) -> Option<usize> {
    value
        .and_then(Value::as_number)
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize)
}

fn by_action(store: &TableStore, table: &str, action: &str) -> Vec<Row> {
    store.lookup(table, &fact! { "action" => action })
}

fn bindings(store: &TableStore, action: &str, view: &str) -> Result<Vec<(String, Binding)>> {
    let mut mapping = Vec::new();
    for row in by_action(store, ACTION_MAPPING, action) {
        let binding = Binding::field(text(&row, "to source", view)?, text(&row, "to field", view)?);
        mapping.push((text(&row, "from", view)?.to_string(), binding));
    }
    for row in by_action(store, ACTION_MAPPING_CONSTANT, action) {
        let value = row
            .get("value")
            .cloned()
            .ok_or_else(|| Error::invalid_view(view, "constant mapping without a value"))?;
        mapping.push((text(&row, "from", view)?.to_string(), Binding::Constant(value)));
    }
    Ok(mapping)
}

fn columns(store: &TableStore, action: &str, view: &str) -> Result<Vec<(String, Column)>> {
    bindings(store, action, view).map(|mapping| {
        mapping
            .into_iter()
            .map(|(from, binding)| {
                let column = match binding {
                    Binding::Field { field, .. } => Column::Field(field),
                    Binding::Constant(value) => Column::Constant(value),
                };
                (from, column)
            })
            .collect()
    })
}

fn sort_keys(store: &TableStore, action: &str, view: &str) -> Result<Vec<SortKey>> {
    let mut rows = by_action(store, ACTION_MAPPING_SORTED, action);
    rows.sort_by(|a, b| a.get("ix").cmp(&b.get("ix")));
    rows.iter()
        .map(|row| {
            Ok(SortKey {
                alias: text(row, "source", view)?.to_string(),
                field: text(row, "field", view)?.to_string(),
                direction: Direction::parse(row.get("direction").and_then(Value::as_str).unwrap_or("")),
            })
        })
        .collect()
}

fn source(store: &TableStore, action: &str, kind: &str, view: &str) -> Result<String> {
    by_action(store, ACTION_SOURCE, action)
        .first()
        .and_then(|row| row.get("source view"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_view(view, format!("{kind} action without a source")))
}

/// Rebuilds a view from its catalog facts.
pub fn compile(store: &TableStore, registry: Arc<PrimitiveRegistry>, view: &str) -> Result<View> {
    let definition = store
        .lookup(VIEW, &fact! { "view" => view })
        .into_iter()
        .next()
        .ok_or_else(|| Error::view_not_found(view))?;
    let kind = text(&definition, "kind", view)?.to_string();

    let mut actions = store.lookup(ACTION, &fact! { "view" => view });
    if actions.is_empty() {
        return Err(Error::invalid_view(view, "view has no actions"));
    }
    actions.sort_by(|a, b| a.get("ix").cmp(&b.get("ix")));

    match kind.as_str() {
        "query" => {
            let mut query = Query::new(view, registry).with_schemas(store.schemas());
            for action in &actions {
                let id = text(action, "action", view)?;
                let action_kind = text(action, "kind", view)?;
                query = match action_kind {
                    "select" => query.select(&source(store, id, action_kind, view)?, bindings(store, id, view)?, id)?,
                    "deselect" => query.deselect(&source(store, id, action_kind, view)?, bindings(store, id, view)?)?,
                    "calculate" => {
                        query.calculate(&source(store, id, action_kind, view)?, bindings(store, id, view)?, id)?
                    }
                    "aggregate" => {
                        query.aggregate(&source(store, id, action_kind, view)?, bindings(store, id, view)?, id)?
                    }
                    "group" => {
                        let keys = sort_keys(store, id, view)?;
                        query.group(keys.into_iter().map(|key| (key.alias, key.field)))?
                    }
                    "sort" => query.sort(sort_keys(store, id, view)?)?,
                    "limit" => {
                        let mut limit = Limit::default();
                        for row in by_action(store, ACTION_MAPPING_LIMIT, id) {
                            let value = count(row.get("value"));
                            match row.get("limit type").and_then(Value::as_str) {
                                Some("results") => limit.results = value,
                                Some("perGroup") => limit.per_group = value,
                                Some("offset") => limit.offset = value,
                                _ => {}
                            }
                        }
                        query.limit(limit)?
                    }
                    "ordinal" => query.ordinal(id)?,
                    "project" => query.project(bindings(store, id, view)?)?,
                    other => {
                        return Err(Error::invalid_view(view, format!("unknown query action '{other}'")));
                    }
                };
            }
            Ok(View::Query(query))
        }
        "union" => {
            let mut union = Union::new(view).with_schemas(store.schemas());
            for action in &actions {
                let id = text(action, "action", view)?;
                let action_kind = text(action, "kind", view)?;
                if action_kind != "union" {
                    return Err(Error::invalid_view(view, format!("unknown union action '{action_kind}'")));
                }
                union = union.union(&source(store, id, action_kind, view)?, columns(store, id, view)?)?;
            }
            Ok(View::Union(union))
        }
        other => Err(Error::invalid_view(view, format!("views of kind '{other}' cannot be compiled"))),
    }
}
