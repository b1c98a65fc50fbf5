//! Declarative query builder.
//!
//! A `Query` is declared step by step: table selections (joins), negated
//! selections, calculations, aggregates, grouping, sorting, limits, an
//! ordinal and a projection. Every step is validated against the table
//! schemas known when the query was created and against the aliases
//! declared before it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_core::fact;
//! use tessera_query::{Binding, PrimitiveRegistry, Query};
//! use tessera_storage::{Diff, TableStore};
//!
//! let mut store = TableStore::new();
//! let mut diff = Diff::new();
//! diff.add("person", fact! { "name" => "ada", "age" => 36 })
//!     .add("person", fact! { "name" => "bob", "age" => 12 });
//! store.exec_diff(&diff);
//!
//! let mut adults = Query::new("adults", Arc::new(PrimitiveRegistry::new()))
//!     .with_schemas(store.schemas())
//!     .select("person", Vec::<(String, Binding)>::new(), "p").unwrap()
//!     .calculate(">", [("a", Binding::field("p", "age")), ("b", Binding::constant(18))], "check").unwrap()
//!     .project([("name", Binding::field("p", "name"))]).unwrap();
//!
//! let output = adults.exec(&mut store).unwrap();
//! assert_eq!(output.results.len(), 1);
//! ```

use crate::binding::{Binding, Limit, SortKey};
use crate::executor::{self, QueryOutput};
use crate::plan::{self, Plan};
use crate::primitive::{Primitive, PrimitiveRegistry};
use hashbrown::HashMap;
use std::sync::Arc;
use tessera_core::{Error, Result};
use tessera_incremental::ProvenanceLedger;
use tessera_storage::{Changes, Schemas, TableChanges, TableStore};

/// A join-phase step, kept in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Join against a table under an alias.
    Select {
        alias: String,
        table: String,
        mapping: Vec<(String, Binding)>,
    },
    /// Require that no row of the table matches.
    Deselect {
        table: String,
        mapping: Vec<(String, Binding)>,
    },
    /// Apply a filter or scalar primitive.
    Calculate {
        alias: String,
        primitive: String,
        args: Vec<(String, Binding)>,
    },
}

/// An aggregate call evaluated once per group.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub alias: String,
    pub primitive: String,
    pub args: Vec<(String, Binding)>,
}

#[derive(Clone, Debug)]
enum AliasKind {
    Table(String),
    Calculation(Option<String>),
    Aggregate,
    Ordinal,
}

/// A query over the table store.
#[derive(Clone, Debug)]
pub struct Query {
    name: String,
    registry: Arc<PrimitiveRegistry>,
    schemas: Schemas,
    steps: Vec<Step>,
    aggregates: Vec<Aggregate>,
    groups: Vec<SortKey>,
    sorts: Vec<SortKey>,
    limit: Option<Limit>,
    ordinal: Option<String>,
    projection: Option<Vec<(String, Binding)>>,
    aliases: HashMap<String, AliasKind>,
    compiled: Option<Arc<Plan>>,
}

fn collect_mapping<I, K>(mapping: I) -> Vec<(String, Binding)>
where
    I: IntoIterator<Item = (K, Binding)>,
    K: Into<String>,
{
    mapping.into_iter().map(|(k, b)| (k.into(), b)).collect()
}

impl Query {
    /// Creates an empty query named after the view it defines.
    pub fn new(name: impl Into<String>, registry: Arc<PrimitiveRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            schemas: Schemas::new(),
            steps: Vec::new(),
            aggregates: Vec::new(),
            groups: Vec::new(),
            sorts: Vec::new(),
            limit: None,
            ordinal: None,
            projection: None,
            aliases: HashMap::new(),
            compiled: None,
        }
    }

    /// Sets the table schemas mappings are validated against.
    pub fn with_schemas(mut self, schemas: Schemas) -> Self {
        self.schemas = schemas;
        self
    }

    /// Joins `table` under `alias`. Each mapping entry binds a table field
    /// to a constant or to a field of an earlier alias.
    pub fn select<I, K>(mut self, table: &str, mapping: I, alias: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        let mapping = collect_mapping(mapping);
        self.check_table_fields(table, &mapping)?;
        self.check_bindings(mapping.iter().map(|(_, b)| b), false)?;
        self.declare(alias, AliasKind::Table(table.to_string()))?;
        self.steps.push(Step::Select {
            alias: alias.to_string(),
            table: table.to_string(),
            mapping,
        });
        Ok(self.touched())
    }

    /// Keeps only tuples for which no row of `table` matches the mapping.
    pub fn deselect<I, K>(mut self, table: &str, mapping: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        let mapping = collect_mapping(mapping);
        self.check_table_fields(table, &mapping)?;
        self.check_bindings(mapping.iter().map(|(_, b)| b), false)?;
        self.steps.push(Step::Deselect {
            table: table.to_string(),
            mapping,
        });
        Ok(self.touched())
    }

    /// Applies a filter or scalar primitive. Scalar results are bound to
    /// `alias` under the primitive's result field.
    pub fn calculate<I, K>(mut self, primitive: &str, args: I, alias: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        let args = collect_mapping(args);
        let found = self.registry.get(primitive)?;
        if found.is_aggregate() {
            return Err(Error::primitive_kind(primitive, "a calculation"));
        }
        check_params(&found, &args)?;
        self.check_bindings(args.iter().map(|(_, b)| b), false)?;
        if !found.is_filter() {
            let result = found.result_field().map(str::to_string);
            self.declare(alias, AliasKind::Calculation(result))?;
        }
        self.steps.push(Step::Calculate {
            alias: alias.to_string(),
            primitive: primitive.to_string(),
            args,
        });
        Ok(self.touched())
    }

    /// Folds each group through an aggregate primitive.
    pub fn aggregate<I, K>(mut self, primitive: &str, args: I, alias: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        let args = collect_mapping(args);
        let found = self.registry.get(primitive)?;
        if !found.is_aggregate() {
            return Err(Error::primitive_kind(primitive, "an aggregate"));
        }
        check_params(&found, &args)?;
        self.check_bindings(args.iter().map(|(_, b)| b), false)?;
        self.declare(alias, AliasKind::Aggregate)?;
        self.aggregates.push(Aggregate {
            alias: alias.to_string(),
            primitive: primitive.to_string(),
            args,
        });
        Ok(self.touched())
    }

    /// Groups tuples by `(alias, field)` keys, ascending.
    pub fn group<I, A, F>(mut self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, F)>,
        A: Into<String>,
        F: Into<String>,
    {
        let keys: Vec<SortKey> = keys.into_iter().map(|(a, f)| SortKey::asc(a, f)).collect();
        if keys.is_empty() {
            return Err(Error::missing_mapping("group"));
        }
        self.check_keys(&keys)?;
        self.groups = keys;
        Ok(self.touched())
    }

    /// Sorts tuples by the given keys, after any group keys.
    pub fn sort<I>(mut self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = SortKey>,
    {
        let keys: Vec<SortKey> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(Error::missing_mapping("sort"));
        }
        self.check_keys(&keys)?;
        self.sorts = keys;
        Ok(self.touched())
    }

    /// Limits the output. At least one of `results`, `per_group` or
    /// `offset` must be set.
    pub fn limit(mut self, limit: Limit) -> Result<Self> {
        if limit.results.is_none() && limit.per_group.is_none() && limit.offset.is_none() {
            return Err(Error::missing_mapping("limit"));
        }
        self.limit = Some(limit);
        Ok(self.touched())
    }

    /// Binds each output's 0-based rank to `alias`, as field `ordinal`.
    pub fn ordinal(mut self, alias: &str) -> Result<Self> {
        self.declare(alias, AliasKind::Ordinal)?;
        self.ordinal = Some(alias.to_string());
        Ok(self.touched())
    }

    /// Sets the output row shape: output field -> binding.
    pub fn project<I, K>(mut self, mapping: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        let mapping = collect_mapping(mapping);
        if mapping.is_empty() {
            return Err(Error::missing_mapping("projection"));
        }
        self.check_bindings(mapping.iter().map(|(_, b)| b), true)?;
        self.projection = Some(mapping);
        Ok(self.touched())
    }

    fn touched(mut self) -> Self {
        self.compiled = None;
        self
    }

    fn declare(&mut self, alias: &str, kind: AliasKind) -> Result<()> {
        if self.aliases.contains_key(alias) {
            return Err(Error::invalid_view(
                &self.name,
                format!("alias '{alias}' is declared twice"),
            ));
        }
        self.aliases.insert(alias.to_string(), kind);
        Ok(())
    }

    fn check_table_fields(&self, table: &str, mapping: &[(String, Binding)]) -> Result<()> {
        let Some(fields) = self.schemas.get(table) else {
            return Ok(());
        };
        for (field, _) in mapping {
            if !fields.contains(field) {
                return Err(Error::unknown_field(table, field.as_str(), fields));
            }
        }
        Ok(())
    }

    fn check_keys(&self, keys: &[SortKey]) -> Result<()> {
        for key in keys {
            self.check_bindings([&Binding::field(key.alias.as_str(), key.field.as_str())], false)?;
        }
        Ok(())
    }

    /// Validates field bindings. Aggregate and ordinal aliases are only
    /// visible to the projection.
    fn check_bindings<'b, I>(&self, bindings: I, projection: bool) -> Result<()>
    where
        I: IntoIterator<Item = &'b Binding>,
    {
        for binding in bindings {
            let Binding::Field { alias, field } = binding else {
                continue;
            };
            let kind = self.aliases.get(alias).ok_or_else(|| Error::unknown_alias(alias.as_str()))?;
            match kind {
                AliasKind::Table(table) => {
                    if let Some(fields) = self.schemas.get(table) {
                        if !fields.contains(field) {
                            return Err(Error::unknown_field(table.as_str(), field.as_str(), fields));
                        }
                    }
                }
                AliasKind::Calculation(Some(result)) => {
                    if field != result {
                        return Err(Error::unknown_field(alias.as_str(), field.as_str(), &[result.clone()]));
                    }
                }
                AliasKind::Calculation(None) => {}
                AliasKind::Aggregate | AliasKind::Ordinal if !projection => {
                    return Err(Error::invalid_view(
                        &self.name,
                        format!("'{alias}' is only available to the projection"),
                    ));
                }
                AliasKind::Aggregate | AliasKind::Ordinal => {}
            }
        }
        Ok(())
    }

    /// Returns the query (and view) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the primitive registry.
    pub fn registry(&self) -> &PrimitiveRegistry {
        &self.registry
    }

    /// Returns the join-phase steps in declaration order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the aggregate calls.
    pub fn aggregates(&self) -> &[Aggregate] {
        &self.aggregates
    }

    /// Returns the group keys.
    pub fn groups(&self) -> &[SortKey] {
        &self.groups
    }

    /// Returns the sort keys.
    pub fn sorts(&self) -> &[SortKey] {
        &self.sorts
    }

    /// Returns the limit, if set.
    pub fn limit_clause(&self) -> Option<Limit> {
        self.limit
    }

    /// Returns the ordinal alias, if set.
    pub fn ordinal_alias(&self) -> Option<&str> {
        self.ordinal.as_deref()
    }

    /// Returns the projection mapping, if set.
    pub fn projection(&self) -> Option<&[(String, Binding)]> {
        self.projection.as_deref()
    }

    /// Output field names, in projection order.
    pub fn output_fields(&self) -> Vec<String> {
        self.projection
            .iter()
            .flatten()
            .map(|(field, _)| field.clone())
            .collect()
    }

    /// Distinct tables read by the query, in declaration order.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for step in &self.steps {
            let table = match step {
                Step::Select { table, .. } | Step::Deselect { table, .. } => table,
                Step::Calculate { .. } => continue,
            };
            if !tables.contains(table) {
                tables.push(table.clone());
            }
        }
        tables
    }

    fn plan(&mut self) -> Result<Arc<Plan>> {
        if let Some(plan) = &self.compiled {
            return Ok(plan.clone());
        }
        let plan = Arc::new(plan::compile(self)?);
        self.compiled = Some(plan.clone());
        Ok(plan)
    }

    /// Compiles the query, reporting any error. Compilation is cached until
    /// the next builder call.
    pub fn compile(&mut self) -> Result<()> {
        self.plan().map(|_| ())
    }

    /// Returns true if removals and additions can be maintained from
    /// provenance and reverse joins instead of full re-evaluation.
    pub fn can_be_incremental(&mut self) -> Result<bool> {
        Ok(self.plan()?.incremental)
    }

    /// Evaluates the query from scratch.
    pub fn exec(&mut self, store: &mut TableStore) -> Result<QueryOutput> {
        let plan = self.plan()?;
        Ok(executor::evaluate(&plan, &self.name, store))
    }

    /// Evaluates from scratch and diffs against the view table's contents,
    /// replacing the view's provenance.
    pub fn exec_full_delta(
        &mut self,
        store: &mut TableStore,
        ledger: &mut ProvenanceLedger,
    ) -> Result<TableChanges> {
        let output = self.exec(store)?;
        Ok(executor::full_delta(&self.name, output, store, ledger))
    }

    /// Brings the view up to date with `changes`, the real changes of the
    /// previous propagation round. Falls back to full evaluation when the
    /// query is not incremental.
    pub fn exec_incremental(
        &mut self,
        store: &mut TableStore,
        ledger: &mut ProvenanceLedger,
        changes: &Changes,
    ) -> Result<TableChanges> {
        let plan = self.plan()?;
        if !plan.incremental {
            let output = executor::evaluate(&plan, &self.name, store);
            return Ok(executor::full_delta(&self.name, output, store, ledger));
        }
        Ok(executor::incremental::apply(&plan, &self.name, store, ledger, changes))
    }
}

fn check_params(primitive: &Primitive, args: &[(String, Binding)]) -> Result<()> {
    for param in primitive.params() {
        if !args.iter().any(|(name, _)| name == param) {
            return Err(Error::missing_argument(primitive.name(), param.as_str()));
        }
    }
    Ok(())
}
