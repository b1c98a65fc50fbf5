//! Compiled query plans.
//!
//! A plan resolves every alias to a tuple slot and every primitive to its
//! registry entry. Steps keep declaration order: scans, negated scans,
//! filters and calculations run as one nested loop, then the aggregate
//! pass sorts, groups, limits and projects.

use crate::binding::{Binding, Direction, Limit};
use crate::primitive::Primitive;
use crate::query::{Query, Step};
use hashbrown::HashMap;
use std::sync::Arc;
use tessera_core::{Error, Fact, Result, Row, Value};

/// One slot of a tuple under evaluation.
#[derive(Clone, Debug, Default)]
pub enum Slot {
    /// Not bound yet.
    #[default]
    Empty,
    /// A row joined from a table.
    Row(Row),
    /// A calculation result, aggregate state or ordinal.
    Computed(Arc<Fact>),
}

impl Slot {
    /// Returns the fact bound to the slot.
    pub fn fact(&self) -> Option<&Fact> {
        match self {
            Slot::Empty => None,
            Slot::Row(row) => Some(row.fact()),
            Slot::Computed(fact) => Some(fact),
        }
    }

    /// Returns the joined row, if the slot holds one.
    pub fn row(&self) -> Option<&Row> {
        match self {
            Slot::Row(row) => Some(row),
            _ => None,
        }
    }
}

/// A tuple: one slot per alias.
pub type Tuple = Vec<Slot>;

/// A primitive argument or projected value.
#[derive(Clone, Debug)]
pub(crate) enum Arg {
    Constant(Value),
    Slot { slot: usize, field: String },
}

impl Arg {
    pub(crate) fn resolve<'a>(&'a self, tuple: &'a [Slot]) -> Option<&'a Value> {
        match self {
            Arg::Constant(value) => Some(value),
            Arg::Slot { slot, field } => tuple.get(*slot)?.fact()?.get(field),
        }
    }
}

/// Resolves every argument, or nothing if one is unbound.
pub(crate) fn resolve_all<'a>(args: &'a [Arg], tuple: &'a [Slot]) -> Option<Vec<&'a Value>> {
    args.iter().map(|arg| arg.resolve(tuple)).collect()
}

/// A table lookup: constants plus fields bound from earlier slots.
#[derive(Clone, Debug)]
pub(crate) struct ScanStep {
    pub table: String,
    pub constants: Vec<(String, Value)>,
    /// `(table field, source slot, source field)`
    pub refs: Vec<(String, usize, String)>,
}

impl ScanStep {
    /// Pattern for this scan under a partially bound tuple. `None` if a
    /// referenced value is missing.
    pub(crate) fn pattern(&self, tuple: &[Slot]) -> Option<Fact> {
        let mut pattern = Fact::new();
        for (field, value) in &self.constants {
            pattern.insert(field.as_str(), value.clone());
        }
        for (field, slot, source_field) in &self.refs {
            let value = tuple.get(*slot)?.fact()?.get(source_field)?;
            pattern.insert(field.as_str(), value.clone());
        }
        Some(pattern)
    }

    pub(crate) fn constants_match(&self, row: &Row) -> bool {
        self.constants
            .iter()
            .all(|(field, value)| row.get(field) == Some(value))
    }
}

#[derive(Clone, Debug)]
pub(crate) enum PlanStep {
    Scan { slot: usize, scan: ScanStep },
    Anti(ScanStep),
    Filter { primitive: Arc<Primitive>, args: Vec<Arg> },
    Compute { primitive: Arc<Primitive>, args: Vec<Arg>, slot: usize },
}

#[derive(Clone, Debug)]
pub(crate) struct AggregatePlan {
    pub primitive: Arc<Primitive>,
    pub args: Vec<Arg>,
    pub slot: usize,
}

/// Executable form of a [`Query`].
#[derive(Clone, Debug)]
pub(crate) struct Plan {
    pub steps: Vec<PlanStep>,
    pub width: usize,
    /// `(slot, table)` of every positive scan, in step order.
    pub joins: Vec<(usize, String)>,
    pub aggregates: Vec<AggregatePlan>,
    pub groups: Vec<(usize, String)>,
    /// Group keys first, then sort keys.
    pub order: Vec<(usize, String, Direction)>,
    pub limit: Limit,
    pub ordinal: Option<usize>,
    pub projection: Option<Vec<(String, Arg)>>,
    pub output_fields: Vec<String>,
    /// Joins only, rooted at a positive scan: eligible for reverse-join
    /// evaluation.
    pub incremental: bool,
}

struct Slots<'q> {
    by_alias: HashMap<&'q str, usize>,
    width: usize,
}

impl<'q> Slots<'q> {
    fn allocate(&mut self, alias: &'q str) -> usize {
        let slot = self.width;
        self.by_alias.insert(alias, slot);
        self.width += 1;
        slot
    }

    fn arg(&self, binding: &Binding) -> Result<Arg> {
        match binding {
            Binding::Constant(value) => Ok(Arg::Constant(value.clone())),
            Binding::Field { alias, field } => {
                let slot = *self
                    .by_alias
                    .get(alias.as_str())
                    .ok_or_else(|| Error::unknown_alias(alias.as_str()))?;
                Ok(Arg::Slot {
                    slot,
                    field: field.clone(),
                })
            }
        }
    }

    fn key(&self, alias: &str, field: &str) -> Result<(usize, String)> {
        let slot = *self
            .by_alias
            .get(alias)
            .ok_or_else(|| Error::unknown_alias(alias))?;
        Ok((slot, field.to_string()))
    }

    fn scan(&self, table: &str, mapping: &[(String, Binding)]) -> Result<ScanStep> {
        let mut scan = ScanStep {
            table: table.to_string(),
            constants: Vec::new(),
            refs: Vec::new(),
        };
        for (field, binding) in mapping {
            match self.arg(binding)? {
                Arg::Constant(value) => scan.constants.push((field.clone(), value)),
                Arg::Slot { slot, field: source } => scan.refs.push((field.clone(), slot, source)),
            }
        }
        Ok(scan)
    }

    fn args(&self, primitive: &Primitive, bound: &[(String, Binding)]) -> Result<Vec<Arg>> {
        primitive
            .params()
            .iter()
            .map(|param| {
                let binding = bound
                    .iter()
                    .find(|(name, _)| name == param)
                    .map(|(_, binding)| binding)
                    .ok_or_else(|| Error::missing_argument(primitive.name(), param.as_str()))?;
                self.arg(binding)
            })
            .collect()
    }
}

/// Compiles a query into a plan.
pub(crate) fn compile(query: &Query) -> Result<Plan> {
    let registry = query.registry();
    let mut slots = Slots {
        by_alias: HashMap::new(),
        width: 0,
    };
    let mut steps = Vec::with_capacity(query.steps().len());
    let mut joins = Vec::new();
    let mut has_negation = false;

    for step in query.steps() {
        match step {
            Step::Select { alias, table, mapping } => {
                let scan = slots.scan(table, mapping)?;
                let slot = slots.allocate(alias);
                joins.push((slot, table.clone()));
                steps.push(PlanStep::Scan { slot, scan });
            }
            Step::Deselect { table, mapping } => {
                has_negation = true;
                steps.push(PlanStep::Anti(slots.scan(table, mapping)?));
            }
            Step::Calculate { alias, primitive, args } => {
                let primitive = registry.get(primitive)?;
                let args = slots.args(&primitive, args)?;
                if primitive.is_filter() {
                    steps.push(PlanStep::Filter { primitive, args });
                } else if primitive.is_aggregate() {
                    return Err(Error::primitive_kind(primitive.name(), "a calculation"));
                } else {
                    let slot = slots.allocate(alias);
                    steps.push(PlanStep::Compute { primitive, args, slot });
                }
            }
        }
    }

    let order_prefix = query
        .groups()
        .iter()
        .map(|key| {
            let (slot, field) = slots.key(&key.alias, &key.field)?;
            Ok((slot, field, key.direction))
        })
        .collect::<Result<Vec<_>>>()?;
    let groups = order_prefix
        .iter()
        .map(|(slot, field, _)| (*slot, field.clone()))
        .collect();
    let mut order = order_prefix;
    for key in query.sorts() {
        let (slot, field) = slots.key(&key.alias, &key.field)?;
        order.push((slot, field, key.direction));
    }

    let mut aggregates = Vec::with_capacity(query.aggregates().len());
    for aggregate in query.aggregates() {
        let primitive = registry.get(&aggregate.primitive)?;
        if !primitive.is_aggregate() {
            return Err(Error::primitive_kind(primitive.name(), "an aggregate"));
        }
        let args = slots.args(&primitive, &aggregate.args)?;
        let slot = slots.allocate(&aggregate.alias);
        aggregates.push(AggregatePlan { primitive, args, slot });
    }

    let ordinal = query.ordinal_alias().map(|alias| slots.allocate(alias));

    let projection = match query.projection() {
        Some(mapping) => Some(
            mapping
                .iter()
                .map(|(field, binding)| Ok((field.clone(), slots.arg(binding)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        None => None,
    };
    let output_fields = query.output_fields();

    let rooted = matches!(steps.first(), Some(PlanStep::Scan { .. }));
    let incremental = rooted
        && !has_negation
        && aggregates.is_empty()
        && order.is_empty()
        && query.limit_clause().is_none()
        && ordinal.is_none();

    Ok(Plan {
        steps,
        width: slots.width,
        joins,
        aggregates,
        groups,
        order,
        limit: query.limit_clause().unwrap_or_default(),
        ordinal,
        projection,
        output_fields,
        incremental,
    })
}
