//! Primitive functions usable in calculations, filters and aggregates.
//!
//! Primitives are registered by name in a [`PrimitiveRegistry`]. Each one
//! declares its parameter names; call sites bind every parameter to a
//! constant or to an aliased field.
//!
//! - Filters decide whether a tuple survives.
//! - Scalars produce a value stored under their result field. A scalar that
//!   yields nothing prunes the tuple.
//! - Aggregates fold a group of tuples into a state fact.

use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::{Error, Fact, Result, Value};

/// Signature of a filter primitive.
pub type FilterFn = dyn Fn(&[&Value]) -> bool + Send + Sync;
/// Signature of a scalar primitive.
pub type ScalarFn = dyn Fn(&[&Value]) -> Option<Value> + Send + Sync;
/// Signature of an aggregate primitive: folds one tuple into the state.
pub type AggregateFn = dyn Fn(&mut Fact, &[&Value]) + Send + Sync;

/// What a primitive does with its arguments.
pub enum PrimitiveKind {
    /// Keeps or drops a tuple.
    Filter(Box<FilterFn>),
    /// Computes one value.
    Scalar(Box<ScalarFn>),
    /// Accumulates into a per-group state.
    Aggregate(Box<AggregateFn>),
}

/// A named primitive with declared parameters.
pub struct Primitive {
    name: String,
    params: Vec<String>,
    result: Option<String>,
    kind: PrimitiveKind,
}

impl Primitive {
    /// Defines a filter primitive.
    pub fn filter<F>(name: &str, params: &[&str], func: F) -> Self
    where
        F: Fn(&[&Value]) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            result: None,
            kind: PrimitiveKind::Filter(Box::new(func)),
        }
    }

    /// Defines a scalar primitive whose value is stored under `result`.
    pub fn scalar<F>(name: &str, params: &[&str], result: &str, func: F) -> Self
    where
        F: Fn(&[&Value]) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            result: Some(result.to_string()),
            kind: PrimitiveKind::Scalar(Box::new(func)),
        }
    }

    /// Defines an aggregate primitive whose state exposes `result`.
    pub fn aggregate<F>(name: &str, params: &[&str], result: &str, func: F) -> Self
    where
        F: Fn(&mut Fact, &[&Value]) + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            result: Some(result.to_string()),
            kind: PrimitiveKind::Aggregate(Box::new(func)),
        }
    }

    /// Returns the primitive name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared parameter names, in call order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Returns the field a scalar or aggregate writes its result to.
    pub fn result_field(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Returns the primitive kind.
    pub fn kind(&self) -> &PrimitiveKind {
        &self.kind
    }

    /// Returns true for filter primitives.
    pub fn is_filter(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Filter(_))
    }

    /// Returns true for aggregate primitives.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Aggregate(_))
    }

    pub(crate) fn test(&self, args: &[&Value]) -> bool {
        match &self.kind {
            PrimitiveKind::Filter(func) => func(args),
            _ => false,
        }
    }

    pub(crate) fn compute(&self, args: &[&Value]) -> Option<Fact> {
        match (&self.kind, &self.result) {
            (PrimitiveKind::Scalar(func), Some(result)) => {
                func(args).map(|value| Fact::new().with(result.as_str(), value))
            }
            _ => None,
        }
    }

    pub(crate) fn accumulate(&self, state: &mut Fact, args: &[&Value]) {
        if let PrimitiveKind::Aggregate(func) = &self.kind {
            func(state, args);
        }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PrimitiveKind::Filter(_) => "filter",
            PrimitiveKind::Scalar(_) => "scalar",
            PrimitiveKind::Aggregate(_) => "aggregate",
        };
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("kind", &kind)
            .finish()
    }
}

/// Name-indexed set of primitives.
#[derive(Debug, Clone)]
pub struct PrimitiveRegistry {
    primitives: HashMap<String, Arc<Primitive>>,
}

impl PrimitiveRegistry {
    /// Creates a registry with no primitives.
    pub fn empty() -> Self {
        Self {
            primitives: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in primitives.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        register_builtins(&mut registry);
        registry
    }

    /// Registers a primitive, replacing any previous one of the same name.
    pub fn register(&mut self, primitive: Primitive) -> &mut Self {
        self.primitives
            .insert(primitive.name.clone(), Arc::new(primitive));
        self
    }

    /// Looks up a primitive.
    pub fn get(&self, name: &str) -> Result<Arc<Primitive>> {
        self.primitives
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_primitive(name))
    }

    /// Returns true if a primitive of that name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.primitives.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primitives.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn number(value: &Value) -> Option<f64> {
    value.as_number()
}

fn arithmetic(op: fn(f64, f64) -> f64) -> impl Fn(&[&Value]) -> Option<Value> + Send + Sync {
    move |args: &[&Value]| match args {
        [a, b] => Some(Value::Number(op(number(a)?, number(b)?))),
        _ => None,
    }
}

fn comparison(accept: fn(std::cmp::Ordering) -> bool) -> impl Fn(&[&Value]) -> bool + Send + Sync {
    move |args: &[&Value]| match args {
        [a, b] => a.compare(b).is_some_and(accept),
        _ => false,
    }
}

fn add_to(state: &mut Fact, field: &str, amount: f64) -> f64 {
    let total = state.get(field).and_then(Value::as_number).unwrap_or(0.0) + amount;
    state.insert(field, total);
    total
}

fn register_builtins(registry: &mut PrimitiveRegistry) {
    const PAIR: &[&str] = &["a", "b"];

    registry
        .register(Primitive::filter("=", PAIR, |args| match args {
            [a, b] => a == b,
            _ => false,
        }))
        .register(Primitive::filter("!=", PAIR, |args| match args {
            [a, b] => a != b,
            _ => false,
        }))
        .register(Primitive::filter(">", PAIR, comparison(|o| o.is_gt())))
        .register(Primitive::filter("<", PAIR, comparison(|o| o.is_lt())))
        .register(Primitive::filter(">=", PAIR, comparison(|o| o.is_ge())))
        .register(Primitive::filter("<=", PAIR, comparison(|o| o.is_le())));

    registry
        .register(Primitive::scalar("+", PAIR, "result", |args| match args {
            [Value::String(a), Value::String(b)] => Some(Value::String(format!("{a}{b}"))),
            [a, b] => Some(Value::Number(number(a)? + number(b)?)),
            _ => None,
        }))
        .register(Primitive::scalar("-", PAIR, "result", arithmetic(|a, b| a - b)))
        .register(Primitive::scalar("*", PAIR, "result", arithmetic(|a, b| a * b)))
        .register(Primitive::scalar("/", PAIR, "result", arithmetic(|a, b| a / b)))
        .register(Primitive::scalar("^", PAIR, "result", arithmetic(f64::powf)))
        .register(Primitive::scalar("lowercase", &["text"], "result", |args| match args {
            [Value::String(text)] => Some(Value::String(text.to_lowercase())),
            [other] => Some((*other).clone()),
            _ => None,
        }));

    registry
        .register(Primitive::aggregate("count", &[], "count", |state, _| {
            add_to(state, "count", 1.0);
        }))
        .register(Primitive::aggregate("sum", &["value"], "sum", |state, args| {
            if let Some(value) = args.first().and_then(|v| v.as_number()) {
                add_to(state, "sum", value);
            }
        }))
        .register(Primitive::aggregate("average", &["value"], "average", |state, args| {
            if let Some(value) = args.first().and_then(|v| v.as_number()) {
                let count = add_to(state, "count", 1.0);
                let sum = add_to(state, "sum", value);
                state.insert("average", sum / count);
            }
        }));
}
