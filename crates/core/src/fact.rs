//! Facts, fact identities and stored rows.
//!
//! A [`Fact`] is an ordered record of `field -> value` pairs. Its identity is
//! a [`FactId`]: a content hash over the values of a field sequence. Two
//! facts with the same values under the same field order share an identity,
//! which is how tables collapse duplicates.

use crate::value::Value;
use core::fmt;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

const MISSING_FIELD: u8 = 0;
const PRESENT_FIELD: u8 = 1;

/// Content-derived identity of a fact, or of a combination of facts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactId(u128);

impl FactId {
    /// Hashes a sequence of optional values. `None` marks a missing field.
    pub fn of_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a Value>>,
    {
        let mut hasher = blake3::Hasher::new();
        for value in values {
            match value {
                Some(value) => {
                    hasher.update(&[PRESENT_FIELD]);
                    value.encode(&mut hasher);
                }
                None => {
                    hasher.update(&[MISSING_FIELD]);
                }
            }
        }
        Self::from_hasher(&hasher)
    }

    /// Identity of a name, used to tag table names inside combined ids.
    pub fn of_name(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"name:");
        hasher.update(name.as_bytes());
        Self::from_hasher(&hasher)
    }

    /// Combines an ordered sequence of ids into a single id.
    ///
    /// Used for row instances: the ids of the source rows that jointly
    /// produced an output.
    pub fn combine<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = FactId>,
    {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"combine:");
        for id in ids {
            hasher.update(&id.0.to_le_bytes());
        }
        Self::from_hasher(&hasher)
    }

    /// Returns the raw 128-bit identity.
    #[inline]
    pub fn as_u128(&self) -> u128 {
        self.0
    }

    fn from_hasher(hasher: &blake3::Hasher) -> Self {
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[..16]);
        FactId(u128::from_le_bytes(bytes))
    }
}

impl fmt::Debug for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactId({:08x})", (self.0 >> 96) as u32)
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// An ordered record mapping field names to values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fact {
    fields: Vec<(String, Value)>,
}

impl Fact {
    /// Creates an empty fact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Sets a field, replacing the value in place if the field exists.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    /// Returns the value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Returns true if the fact has the field.
    pub fn contains_field(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Iterates over `(field, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the field names in insertion order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the fact has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true if every field of `pattern` is present here with an
    /// equal value.
    pub fn matches(&self, pattern: &Fact) -> bool {
        pattern
            .iter()
            .all(|(field, value)| self.get(field) == Some(value))
    }

    /// Identity over the given field order.
    pub fn identity(&self, order: &[String]) -> FactId {
        FactId::of_values(order.iter().map(|field| self.get(field)))
    }

    /// Identity over the fact's own field order.
    pub fn identity_in_order(&self) -> FactId {
        FactId::of_values(self.fields.iter().map(|(_, value)| Some(value)))
    }
}

impl<K, V> FromIterator<(K, V)> for Fact
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fact = Fact::new();
        for (field, value) in iter {
            fact.insert(field, value);
        }
        fact
    }
}

impl Serialize for Fact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, value) in &self.fields {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Fact {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FactVisitor;

        impl<'de> Visitor<'de> for FactVisitor {
            type Value = Fact;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fact, A::Error> {
                let mut fact = Fact::new();
                while let Some((field, value)) = access.next_entry::<String, Value>()? {
                    fact.insert(field, value);
                }
                Ok(fact)
            }
        }

        deserializer.deserialize_map(FactVisitor)
    }
}

/// A fact stored in a table, paired with its identity.
///
/// Cloning is cheap: the fact body is shared.
#[derive(Clone, Debug)]
pub struct Row {
    id: FactId,
    fact: Arc<Fact>,
}

impl Row {
    /// Creates a row from an identity and a shared fact.
    pub fn new(id: FactId, fact: Arc<Fact>) -> Self {
        Self { id, fact }
    }

    /// Returns the row identity.
    #[inline]
    pub fn id(&self) -> FactId {
        self.id
    }

    /// Returns the fact body.
    #[inline]
    pub fn fact(&self) -> &Fact {
        &self.fact
    }

    /// Returns the shared fact body.
    #[inline]
    pub fn shared(&self) -> &Arc<Fact> {
        &self.fact
    }

    /// Returns the value of a field.
    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fact.get(field)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Row {}

/// Builds a [`Fact`] from `field => value` pairs.
///
/// ```rust
/// use tessera_core::{fact, Value};
///
/// let f = fact! { "name" => "ada", "age" => 36 };
/// assert_eq!(f.get("age"), Some(&Value::Number(36.0)));
/// ```
#[macro_export]
macro_rules! fact {
    () => {
        $crate::Fact::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut fact = $crate::Fact::new();
        $(fact.insert($field, $value);)+
        fact
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order() {
        let mut f = Fact::new().with("b", 1).with("a", 2);
        f.insert("b", 3);
        assert_eq!(f.field_names(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(f.get("b"), Some(&Value::from(3)));
    }

    #[test]
    fn test_identity_depends_on_order_not_insertion() {
        let x = fact! { "a" => 1, "b" => "two" };
        let y = fact! { "b" => "two", "a" => 1 };
        let order = vec!["a".to_string(), "b".to_string()];
        assert_eq!(x.identity(&order), y.identity(&order));
        assert_ne!(x.identity_in_order(), y.identity_in_order());
    }

    #[test]
    fn test_identity_distinguishes_types_and_missing() {
        let order = vec!["a".to_string()];
        let num = fact! { "a" => 1 };
        let text = fact! { "a" => "1" };
        let missing = fact! { "b" => 1 };
        assert_ne!(num.identity(&order), text.identity(&order));
        assert_ne!(num.identity(&order), missing.identity(&order));
    }

    #[test]
    fn test_identity_string_boundaries() {
        let order = vec!["a".to_string(), "b".to_string()];
        let x = fact! { "a" => "ab", "b" => "c" };
        let y = fact! { "a" => "a", "b" => "bc" };
        assert_ne!(x.identity(&order), y.identity(&order));
    }

    #[test]
    fn test_combine_is_order_sensitive() {
        let a = FactId::of_name("a");
        let b = FactId::of_name("b");
        assert_ne!(FactId::combine([a, b]), FactId::combine([b, a]));
        assert_eq!(FactId::combine([a, b]), FactId::combine([a, b]));
    }

    #[test]
    fn test_matches_pattern() {
        let f = fact! { "name" => "ada", "age" => 36 };
        assert!(f.matches(&fact! { "name" => "ada" }));
        assert!(f.matches(&Fact::new()));
        assert!(!f.matches(&fact! { "name" => "bob" }));
        assert!(!f.matches(&fact! { "missing" => 1 }));
    }

    #[test]
    fn test_serde_preserves_field_order() {
        let f = fact! { "z" => 1, "a" => Value::id("k") };
        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(json, r#"{"z":1.0,"a":{"id":"k"}}"#);
        let back: Fact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
        assert_eq!(back.field_names(), f.field_names());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn fields() -> impl Strategy<Value = Vec<(String, i32)>> {
            prop::collection::btree_map("[a-e]", -3i32..3, 0..5)
                .prop_map(|map| map.into_iter().collect())
        }

        proptest! {
            #[test]
            fn identity_ignores_insertion_order(fields in fields()) {
                let order: Vec<String> = fields.iter().map(|(name, _)| name.clone()).collect();
                let forward: Fact = fields.iter().cloned().collect();
                let backward: Fact = fields.iter().rev().cloned().collect();
                prop_assert_eq!(forward.identity(&order), backward.identity(&order));
                prop_assert_eq!(forward.identity(&order), forward.identity_in_order());
            }

            #[test]
            fn identity_separates_different_values(fields in fields(), bump in 1i32..4) {
                prop_assume!(!fields.is_empty());
                let order: Vec<String> = fields.iter().map(|(name, _)| name.clone()).collect();
                let fact: Fact = fields.iter().cloned().collect();
                let mut other = fact.clone();
                other.insert(fields[0].0.clone(), fields[0].1 + bump);
                prop_assert_ne!(fact.identity(&order), other.identity(&order));
            }
        }
    }
}
