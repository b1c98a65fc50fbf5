//! Value types for Tessera.
//!
//! A [`Value`] is the scalar stored under each field of a [`Fact`](crate::Fact).
//! Values are strings, numbers, booleans or opaque identifiers.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// A runtime value held by a fact field.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "WireValue", into = "WireValue")]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// 64-bit floating point number.
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Opaque identifier, encoded as `{"id": "..."}` on the wire.
    Id(String),
}

/// Serialized form of a [`Value`].
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Id { id: String },
}

impl From<WireValue> for Value {
    fn from(wire: WireValue) -> Self {
        match wire {
            WireValue::Boolean(b) => Value::Boolean(b),
            WireValue::Number(n) => Value::Number(n),
            WireValue::String(s) => Value::String(s),
            WireValue::Id { id } => Value::Id(id),
        }
    }
}

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Boolean(b) => WireValue::Boolean(b),
            Value::Number(n) => WireValue::Number(n),
            Value::String(s) => WireValue::String(s),
            Value::Id(id) => WireValue::Id { id },
        }
    }
}

impl Value {
    /// Creates an identifier value.
    pub fn id(id: impl Into<String>) -> Self {
        Value::Id(id.into())
    }

    /// Returns the value as a bool if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as a number if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the identifier if the value is an id.
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Value::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Returns a short name for the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Id(_) => "id",
        }
    }

    /// Compares two values of the same type.
    ///
    /// Returns `None` when the types differ; filter primitives treat that as
    /// a failed comparison rather than coercing.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Feeds a type-tagged encoding of this value into an identity hasher.
    pub(crate) fn encode(&self, hasher: &mut blake3::Hasher) {
        match self {
            Value::Boolean(b) => {
                hasher.update(&[1, *b as u8]);
            }
            Value::Number(n) => {
                hasher.update(&[2]);
                hasher.update(&normalized_bits(*n).to_le_bytes());
            }
            Value::String(s) => {
                hasher.update(&[3]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            Value::Id(id) => {
                hasher.update(&[4]);
                hasher.update(&(id.len() as u64).to_le_bytes());
                hasher.update(id.as_bytes());
            }
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Id(_) => 3,
        }
    }
}

/// Maps `-0.0` onto `0.0` and every NaN onto one bit pattern, so that
/// numbers comparing equal also hash equal.
fn normalized_bits(n: f64) -> u64 {
    if n == 0.0 {
        0f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                // NaN == NaN so values can live in hash sets
                (a.is_nan() && b.is_nan()) || a == b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Id(a), Value::Id(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Boolean(b) => b.hash(state),
            Value::Number(n) => normalized_bits(*n).hash(state),
            Value::String(s) => s.hash(state),
            Value::Id(id) => id.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            _ => match self.compare(other) {
                Some(ordering) => ordering,
                // Different types: order by type
                None => self.type_order().cmp(&other.type_order()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Id(id) => write!(f, "#{}", id),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Number(v as f64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
