//! Tessera Reactive - triggers that keep tables in step with their sources.
//!
//! # Core Concepts
//!
//! - `Trigger`: a name, the tables it watches and what running it does
//! - `TriggerAction`: re-evaluate a view, recompile the view catalog, or run
//!   user callbacks
//! - `TriggerRegistry`: routes table changes to dependent triggers
//!
//! Triggers never call back into the scheduler. A callback returns its
//! output and the scheduler applies it.

pub mod registry;
pub mod trigger;

pub use registry::TriggerRegistry;
pub use trigger::{CustomTrigger, ExecFn, IncrementalFn, Trigger, TriggerAction, TriggerDelta};
