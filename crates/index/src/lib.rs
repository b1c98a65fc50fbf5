//! Tessera Index - hash indexes for the Tessera fact store.
//!
//! This crate provides:
//!
//! - `HashIndex`: O(1) point lookups from a key to the fact ids stored under it,
//!   with O(1) removal of a single id
//! - `IndexStats`: entry and lookup counters
//!
//! # Example
//!
//! ```rust
//! use tessera_core::FactId;
//! use tessera_index::HashIndex;
//!
//! let a = FactId::of_name("a");
//! let b = FactId::of_name("b");
//!
//! let mut index: HashIndex<&str> = HashIndex::new();
//! index.add("red", a);
//! index.add("red", b);
//! assert_eq!(index.get(&"red"), &[a, b]);
//!
//! index.remove(a);
//! assert_eq!(index.get(&"red"), &[b]);
//! ```

pub mod hash;
pub mod stats;

pub use hash::HashIndex;
pub use stats::IndexStats;
