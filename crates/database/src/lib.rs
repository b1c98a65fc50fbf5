//! Tessera Database - the public API of the Tessera fact store.
//!
//! This crate ties the store, the query compiler and the trigger registry
//! together:
//!
//! - `Database`: tables, views, triggers and diff application
//! - `DatabaseConfig`: maintenance mode, round cap and the view catalog
//! - `View`: a query or union registered as a live table
//! - `ApplyReport`: what propagating a diff did
//! - `WireDiff`: `{table, fields, adds, removes}` records for remote peers
//! - `catalog`: views persisted as facts and rebuilt from them
//!
//! # Example
//!
//! ```rust
//! use tessera_core::fact;
//! use tessera_database::{Database, DatabaseConfig};
//! use tessera_query::{Column, PrimitiveRegistry};
//! use std::sync::Arc;
//!
//! let mut db = Database::with_config(DatabaseConfig::incremental(), Arc::new(PrimitiveRegistry::new()));
//! db.add_table("parent", ["from", "to"]);
//!
//! // ancestor = parent ∪ (parent ⋈ ancestor)
//! let step = db
//!     .query("ancestor step")
//!     .select("parent", Vec::<(String, tessera_query::Binding)>::new(), "p").unwrap()
//!     .select("ancestor", [("from", tessera_query::Binding::field("p", "to"))], "a").unwrap()
//!     .project([
//!         ("from", tessera_query::Binding::field("p", "from")),
//!         ("to", tessera_query::Binding::field("a", "to")),
//!     ]).unwrap();
//! let ancestor = db
//!     .union("ancestor")
//!     .union("parent", [("from", Column::field("from")), ("to", Column::field("to"))]).unwrap()
//!     .union("ancestor step", [("from", Column::field("from")), ("to", Column::field("to"))]).unwrap();
//! db.as_view(ancestor).unwrap();
//! db.as_view(step).unwrap();
//!
//! let mut diff = db.diff();
//! diff.add("parent", fact! { "from" => "a", "to" => "b" })
//!     .add("parent", fact! { "from" => "b", "to" => "c" });
//! db.apply(&diff).unwrap();
//!
//! assert!(db.find_one("ancestor", &fact! { "from" => "a", "to" => "c" }).is_some());
//! assert_eq!(db.find("ancestor", &fact! {}).len(), 3);
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod persist;
pub mod scheduler;
pub mod view;
pub mod wire;

pub use config::DatabaseConfig;
pub use database::Database;
pub use scheduler::ApplyReport;
pub use tessera_core::{fact, Error, Fact, FactId, Result, Row, Value};
pub use view::View;
pub use wire::{parse_wire, to_wire_json, WireDiff, WireFact};
