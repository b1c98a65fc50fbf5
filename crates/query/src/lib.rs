//! Tessera Query - view definitions and their evaluation.
//!
//! This crate provides:
//!
//! - `primitive`: Filter, scalar and aggregate primitives and their registry
//! - `binding`: Mapping values, sort keys and limits
//! - `query`: The declarative join/filter/aggregate/projection builder
//! - `plan`: Compilation of a query into a nested-loop plan
//! - `executor`: Full and incremental evaluation
//! - `union`: Set union of several tables
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
//! diff.add("edge", fact! { "from" => "a", "to" => "b" })
//!     .add("edge", fact! { "from" => "b", "to" => "c" });
//! store.exec_diff(&diff);
//!
//! let mut paths = Query::new("path2", Arc::new(PrimitiveRegistry::new()))
//!     .select("edge", Vec::<(String, Binding)>::new(), "e1").unwrap()
//!     .select("edge", [("from", Binding::field("e1", "to"))], "e2").unwrap()
//!     .project([("from", Binding::field("e1", "from")), ("to", Binding::field("e2", "to"))]).unwrap();
//!
//! let output = paths.exec(&mut store).unwrap();
//! assert_eq!(output.results.len(), 1);
//! ```

pub mod binding;
pub mod executor;
pub mod plan;
pub mod primitive;
pub mod query;
pub mod union;

pub use binding::{Binding, Column, Direction, Limit, SortKey};
pub use executor::QueryOutput;
pub use plan::{Slot, Tuple};
pub use primitive::{Primitive, PrimitiveKind, PrimitiveRegistry};
pub use query::{Aggregate, Query, Step};
pub use union::{Union, UnionSource};
