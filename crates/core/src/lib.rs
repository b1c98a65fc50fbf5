//! Tessera Core - value, fact and error types for the Tessera fact store.
//!
//! This crate provides the foundational types shared by every Tessera crate:
//!
//! - `Value`: Scalars stored under fact fields (string, number, boolean, id)
//! - `Fact`: An ordered record of field/value pairs
//! - `FactId`: Content-hash identity of a fact under a field order
//! - `Row`: A stored fact together with its identity
//! - `Error`: Error types for view building, scheduling and I/O
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{fact, Fact, FactId, Value};
//!
//! let a = fact! { "name" => "ada", "age" => 36 };
//! let b: Fact = [("age", Value::from(36)), ("name", Value::from("ada"))]
//!     .into_iter()
//!     .collect();
//!
//! // Identity is taken over a field order, not the insertion order.
//! let order = vec!["name".to_string(), "age".to_string()];
//! assert_eq!(a.identity(&order), b.identity(&order));
//! assert_ne!(a.identity(&order), FactId::of_name("ada"));
//! ```

mod error;
mod fact;
mod value;

pub use error::{Error, Result};
pub use fact::{Fact, FactId, Row};
pub use value::Value;
