//! Trigger registry.
//!
//! Tracks registered triggers and routes table changes to the triggers that
//! watch them.

use crate::trigger::Trigger;
use hashbrown::HashMap;
use std::collections::BTreeSet;

/// A registry of triggers keyed by name.
///
/// # Example
///
/// ```rust
/// use tessera_reactive::{Trigger, TriggerRegistry};
///
/// let mut registry = TriggerRegistry::new();
/// registry.register(Trigger::view("adults", vec!["person".into()]));
///
/// assert_eq!(registry.watching("person"), vec!["adults"]);
/// ```
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    triggers: HashMap<String, Trigger>,
    /// Table -> names of the triggers that watch it
    table_triggers: HashMap<String, BTreeSet<String>>,
}

impl TriggerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a trigger, replacing and returning any trigger of the same
    /// name.
    pub fn register(&mut self, trigger: Trigger) -> Option<Trigger> {
        let previous = self.unregister(trigger.name());
        for table in trigger.tables() {
            self.table_triggers
                .entry(table.clone())
                .or_default()
                .insert(trigger.name().to_string());
        }
        self.triggers.insert(trigger.name().to_string(), trigger);
        previous
    }

    /// Unregisters a trigger by name.
    pub fn unregister(&mut self, name: &str) -> Option<Trigger> {
        let trigger = self.triggers.remove(name)?;
        for table in trigger.tables() {
            if let Some(names) = self.table_triggers.get_mut(table) {
                names.remove(name);
                if names.is_empty() {
                    self.table_triggers.remove(table);
                }
            }
        }
        Some(trigger)
    }

    pub fn get(&self, name: &str) -> Option<&Trigger> {
        self.triggers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Trigger> {
        self.triggers.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.triggers.contains_key(name)
    }

    /// Names of the triggers watching a table, sorted.
    pub fn watching(&self, table: &str) -> Vec<&str> {
        self.table_triggers
            .get(table)
            .map(|names| names.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Names of all registered triggers, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.triggers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Removes every trigger.
    pub fn clear(&mut self) {
        self.triggers.clear();
        self.table_triggers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_route() {
        let mut registry = TriggerRegistry::new();
        registry.register(Trigger::view("v1", vec!["a".into(), "b".into()]));
        registry.register(Trigger::view("v2", vec!["b".into()]));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.watching("a"), vec!["v1"]);
        assert_eq!(registry.watching("b"), vec!["v1", "v2"]);
        assert!(registry.watching("c").is_empty());
    }

    #[test]
    fn test_reregister_replaces_watched_tables() {
        let mut registry = TriggerRegistry::new();
        registry.register(Trigger::view("v", vec!["a".into()]));
        let previous = registry.register(Trigger::view("v", vec!["b".into()]));

        assert!(previous.is_some());
        assert!(registry.watching("a").is_empty());
        assert_eq!(registry.watching("b"), vec!["v"]);
    }

    #[test]
    fn test_unregister() {
        let mut registry = TriggerRegistry::new();
        registry.register(Trigger::view("v", vec!["a".into()]));

        assert!(registry.unregister("v").is_some());
        assert!(registry.unregister("v").is_none());
        assert!(registry.is_empty());
        assert!(registry.watching("a").is_empty());
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = TriggerRegistry::new();
        registry.register(Trigger::view("b", vec![]));
        registry.register(Trigger::view("a", vec![]));
        assert_eq!(registry.names(), vec!["a", "b"]);
        registry.clear();
        assert!(registry.names().is_empty());
    }
}
