//! Bindings, sort keys and limits used when declaring queries and unions.

use tessera_core::Value;

/// The value a mapping entry takes: a constant or a field of an alias.
#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    /// A fixed value.
    Constant(Value),
    /// The value of `field` on whatever `alias` is bound to.
    Field { alias: String, field: String },
}

impl Binding {
    /// Creates a constant binding.
    pub fn constant(value: impl Into<Value>) -> Self {
        Binding::Constant(value.into())
    }

    /// Creates a field binding.
    pub fn field(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Binding::Field {
            alias: alias.into(),
            field: field.into(),
        }
    }

    /// Returns the referenced alias, if any.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Binding::Field { alias, .. } => Some(alias),
            Binding::Constant(_) => None,
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Constant(value)
    }
}

/// A union column: a field of the source table or a constant.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    /// Copy this field of the source row.
    Field(String),
    /// A fixed value.
    Constant(Value),
}

impl Column {
    /// Creates a field column.
    pub fn field(name: impl Into<String>) -> Self {
        Column::Field(name.into())
    }

    /// Creates a constant column.
    pub fn constant(value: impl Into<Value>) -> Self {
        Column::Constant(value.into())
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    /// Name used in persisted view definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "ascending",
            Direction::Descending => "descending",
        }
    }

    /// Parses a persisted direction name. Anything but `descending` sorts
    /// ascending.
    pub fn parse(name: &str) -> Self {
        if name == "descending" {
            Direction::Descending
        } else {
            Direction::Ascending
        }
    }
}

/// A field of an alias used as a sort or group key.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub alias: String,
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    /// Ascending key.
    pub fn asc(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    /// Descending key.
    pub fn desc(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// Output limits.
///
/// `offset` skips leading entries of each group when `per_group` is set,
/// and leading results otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Limit {
    /// Maximum number of results.
    pub results: Option<usize>,
    /// Maximum number of tuples taken from each group.
    pub per_group: Option<usize>,
    /// Number of entries skipped.
    pub offset: Option<usize>,
}

impl Limit {
    /// Caps the number of results.
    pub fn results(n: usize) -> Self {
        Self {
            results: Some(n),
            ..Self::default()
        }
    }

    /// Caps the number of tuples per group.
    pub fn per_group(n: usize) -> Self {
        Self {
            per_group: Some(n),
            ..Self::default()
        }
    }

    /// Adds an offset.
    pub fn with_offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }
}
