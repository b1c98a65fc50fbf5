//! Error types for Tessera.

use thiserror::Error;

/// Result type alias for Tessera operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while building views, scheduling triggers or exchanging
/// facts with the outside world.
#[derive(Debug, Error)]
pub enum Error {
    /// A mapping referenced a field the table does not declare.
    #[error("Table '{table}' doesn't have a field '{field}'.\n\nAvailable fields: {}", available.join(", "))]
    UnknownField {
        table: String,
        field: String,
        available: Vec<String>,
    },
    /// A binding referenced an alias that was never declared.
    #[error("Unknown alias '{alias}'")]
    UnknownAlias { alias: String },
    /// A query or union declared without the mapping it needs.
    #[error("Missing mapping for {kind}")]
    MissingMapping { kind: String },
    /// No primitive registered under the name.
    #[error("Unknown primitive '{name}'")]
    UnknownPrimitive { name: String },
    /// The primitive exists but is the wrong kind for the call site.
    #[error("Primitive '{name}' is not {expected}")]
    PrimitiveKind { name: String, expected: String },
    /// A primitive parameter was left unbound.
    #[error("Primitive '{primitive}' is missing argument '{param}'")]
    MissingArgument { primitive: String, param: String },
    /// No view is registered under the name.
    #[error("View '{view}' not found")]
    ViewNotFound { view: String },
    /// A view definition could not be built or evaluated.
    #[error("Invalid view '{view}': {message}")]
    InvalidView { view: String, message: String },
    /// Trigger propagation did not quiesce within the configured round cap.
    #[error("Trigger propagation exceeded {rounds} rounds")]
    RoundLimit { rounds: usize },
    /// JSON encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A wire diff was malformed.
    #[error("Malformed wire diff: {message}")]
    Wire { message: String },
}

impl Error {
    /// Creates an unknown field error.
    pub fn unknown_field(table: impl Into<String>, field: impl Into<String>, available: &[String]) -> Self {
        Error::UnknownField {
            table: table.into(),
            field: field.into(),
            available: available.to_vec(),
        }
    }

    /// Creates an unknown alias error.
    pub fn unknown_alias(alias: impl Into<String>) -> Self {
        Error::UnknownAlias {
            alias: alias.into(),
        }
    }

    /// Creates a missing mapping error.
    pub fn missing_mapping(kind: impl Into<String>) -> Self {
        Error::MissingMapping { kind: kind.into() }
    }

    /// Creates an unknown primitive error.
    pub fn unknown_primitive(name: impl Into<String>) -> Self {
        Error::UnknownPrimitive { name: name.into() }
    }

    /// Creates a primitive kind error.
    pub fn primitive_kind(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Error::PrimitiveKind {
            name: name.into(),
            expected: expected.into(),
        }
    }

    /// Creates a missing argument error.
    pub fn missing_argument(primitive: impl Into<String>, param: impl Into<String>) -> Self {
        Error::MissingArgument {
            primitive: primitive.into(),
            param: param.into(),
        }
    }

    /// Creates a view not found error.
    pub fn view_not_found(view: impl Into<String>) -> Self {
        Error::ViewNotFound { view: view.into() }
    }

    /// Creates an invalid view error.
    pub fn invalid_view(view: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidView {
            view: view.into(),
            message: message.into(),
        }
    }

    /// Creates a wire format error.
    pub fn wire(message: impl Into<String>) -> Self {
        Error::Wire {
            message: message.into(),
        }
    }
}
