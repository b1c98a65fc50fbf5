//! Tessera Incremental - provenance and truth maintenance for Tessera views.
//!
//! Incrementally maintained views remember why each output row exists. Every
//! derivation of an output row is a *row instance*: the combination of source
//! rows that jointly produced it. When a source row disappears, every
//! instance it took part in is retracted, and an output row that loses its
//! last instance is removed.
//!
//! # Core Concepts
//!
//! - `Delta<T>`: A signed change to a data item (+1 insert, -1 delete)
//! - `settle`: Nets suggested deltas against a view's prior contents
//! - `ProvenanceRecord`: One (output row, row instance, source row) link
//! - `ProvenanceLedger`: Indexed store of provenance records
//! - `retract`: Removes derivations invalidated by source removals
//!
//! # Example
//!
//! ```rust
//! use tessera_core::FactId;
//! use tessera_incremental::{ProvenanceLedger, ProvenanceRecord};
//!
//! let row = FactId::of_name("out");
//! let src = FactId::of_name("in");
//!
//! let mut ledger = ProvenanceLedger::new();
//! ledger.record(ProvenanceRecord::new("v", row, FactId::combine([src]), "t", src));
//!
//! assert_eq!(ledger.supports("v", row).len(), 1);
//! assert_eq!(ledger.by_source("v", "t", src).len(), 1);
//! ```

pub mod delta;
pub mod maintenance;
pub mod provenance;

pub use delta::{settle, Delta};
pub use maintenance::retract;
pub use provenance::{ProvenanceLedger, ProvenanceRecord};
