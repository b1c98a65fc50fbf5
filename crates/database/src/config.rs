//! Database configuration.

use serde::{Deserialize, Serialize};

/// Options fixed when a [`Database`](crate::Database) is created.
///
/// # Example
///
/// ```rust
/// use tessera_database::DatabaseConfig;
///
/// let config: DatabaseConfig = serde_json::from_str(r#"{"incremental": true}"#).unwrap();
/// assert!(config.incremental);
/// assert_eq!(config.max_rounds, None);
/// assert!(config.persisted_views);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Maintain views from per-round deltas instead of re-evaluating them.
    pub incremental: bool,
    /// Give up with `Error::RoundLimit` after this many propagation rounds.
    /// Unbounded when `None`; a view that oscillates never settles.
    pub max_rounds: Option<usize>,
    /// Install the view catalog tables and recompile persisted views when
    /// they change.
    pub persisted_views: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            incremental: false,
            max_rounds: None,
            persisted_views: true,
        }
    }
}

impl DatabaseConfig {
    /// Default configuration with incremental maintenance switched on.
    pub fn incremental() -> Self {
        Self {
            incremental: true,
            ..Self::default()
        }
    }

    /// Sets the round cap.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = Some(rounds);
        self
    }
}
