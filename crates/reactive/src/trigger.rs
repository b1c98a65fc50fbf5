//! Triggers: named reactions to changes in a set of tables.
//!
//! A trigger owns the table of the same name. When one of its watched
//! tables changes, the scheduler runs it and applies its output to that
//! table.

use std::fmt;
use tessera_core::Fact;
use tessera_storage::{Changes, TableStore};

/// Full recompute callback of a custom trigger. Returns the complete new
/// content of the trigger's table, or `None` to leave it untouched.
pub type ExecFn = Box<dyn FnMut(&TableStore) -> Option<Vec<Fact>> + Send>;

/// Incremental callback of a custom trigger. Receives the real changes of
/// the previous round and returns the facts to add and remove.
pub type IncrementalFn = Box<dyn FnMut(&TableStore, &Changes) -> Option<TriggerDelta> + Send>;

/// Output of an incremental trigger callback.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriggerDelta {
    pub adds: Vec<Fact>,
    pub removes: Vec<Fact>,
}

impl TriggerDelta {
    /// Creates an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing changes.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }
}

/// Callbacks of a user-defined trigger.
pub struct CustomTrigger {
    exec: ExecFn,
    exec_incremental: Option<IncrementalFn>,
}

impl CustomTrigger {
    /// Creates a custom trigger from its callbacks.
    pub fn new(exec: ExecFn, exec_incremental: Option<IncrementalFn>) -> Self {
        Self {
            exec,
            exec_incremental,
        }
    }

    /// Runs the full callback.
    pub fn exec(&mut self, store: &TableStore) -> Option<Vec<Fact>> {
        (self.exec)(store)
    }

    /// Returns true if the trigger has an incremental callback.
    pub fn is_incremental(&self) -> bool {
        self.exec_incremental.is_some()
    }

    /// Runs the incremental callback, if there is one.
    pub fn exec_incremental(&mut self, store: &TableStore, changes: &Changes) -> Option<TriggerDelta> {
        self.exec_incremental.as_mut().and_then(|f| f(store, changes))
    }
}

/// What running a trigger does.
pub enum TriggerAction {
    /// Re-evaluates the view of the same name.
    View,
    /// Recompiles the persisted view catalog.
    Recompile,
    /// Runs user callbacks.
    Custom(CustomTrigger),
}

impl TriggerAction {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerAction::View => "view",
            TriggerAction::Recompile => "recompile",
            TriggerAction::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A named trigger and the tables it watches.
#[derive(Debug)]
pub struct Trigger {
    name: String,
    tables: Vec<String>,
    action: TriggerAction,
}

impl Trigger {
    /// Creates a trigger.
    pub fn new(name: impl Into<String>, tables: Vec<String>, action: TriggerAction) -> Self {
        Self {
            name: name.into(),
            tables,
            action,
        }
    }

    /// Trigger for a view.
    pub fn view(name: impl Into<String>, tables: Vec<String>) -> Self {
        Self::new(name, tables, TriggerAction::View)
    }

    /// Trigger with user callbacks.
    pub fn custom(
        name: impl Into<String>,
        tables: Vec<String>,
        exec: ExecFn,
        exec_incremental: Option<IncrementalFn>,
    ) -> Self {
        Self::new(name, tables, TriggerAction::Custom(CustomTrigger::new(exec, exec_incremental)))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tables whose changes run the trigger.
    #[inline]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    #[inline]
    pub fn action(&self) -> &TriggerAction {
        &self.action
    }

    #[inline]
    pub fn action_mut(&mut self) -> &mut TriggerAction {
        &mut self.action
    }
}
