//! Tessera Storage - table store layer for the Tessera fact store.
//!
//! This crate provides the storage layer including:
//!
//! - `Table`: Set-semantics fact storage with lazily built field indexes
//! - `TableStore`: Multi-table management, diff application and trigger lookup
//! - `Diff`: A staged batch of adds and removes across tables
//! - `TableChanges`: The real adds and removes a diff produced
//!
//! # Example
//!
//! ```rust
//! use tessera_core::fact;
//! use tessera_storage::{Diff, TableStore};
//!
//! let mut store = TableStore::new();
//! store.add_table("users", &["id".to_string(), "name".to_string()]);
//!
//! let mut diff = Diff::new();
//! diff.add("users", fact! { "id" => 1, "name" => "Alice" })
//!     .add("users", fact! { "id" => 1, "name" => "Alice" });
//! let outcome = store.exec_diff(&diff);
//!
//! // Duplicate adds collapse into a single stored fact.
//! assert_eq!(outcome.changes["users"].adds.len(), 1);
//! assert_eq!(store.find("users", &fact! { "name" => "Alice" }).len(), 1);
//! ```

pub mod changes;
pub mod diff;
pub mod store;
pub mod table;

pub use changes::{Changes, TableChanges};
pub use diff::{Diff, TableDiff};
pub use store::{DiffOutcome, Schemas, TableStore};
pub use table::Table;
