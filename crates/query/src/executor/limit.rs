//! Limit executor.

use crate::binding::Limit;
use std::ops::Range;

/// Limit executor - applies per-group windows, offsets and the result cap.
pub(crate) struct LimitExecutor {
    limit: Limit,
}

impl LimitExecutor {
    /// Creates a new limit executor.
    pub(crate) fn new(limit: Limit) -> Self {
        Self { limit }
    }

    /// Narrows each group to its window when `per_group` is set. The offset
    /// then skips leading tuples of each group. Empty windows are dropped.
    pub(crate) fn windows(&self, groups: Vec<Range<usize>>) -> Vec<Range<usize>> {
        let Some(per_group) = self.limit.per_group else {
            return groups;
        };
        let offset = self.limit.offset.unwrap_or(0);
        groups
            .into_iter()
            .filter_map(|group| {
                let start = group.start.saturating_add(offset).min(group.end);
                let end = start.saturating_add(per_group).min(group.end);
                (start < end).then_some(start..end)
            })
            .collect()
    }

    /// Applies the stream offset (when not per group) and the result cap.
    pub(crate) fn execute<T>(&self, units: Vec<T>) -> Vec<T> {
        let skip = match self.limit.per_group {
            Some(_) => 0,
            None => self.limit.offset.unwrap_or(0),
        };
        let take = self.limit.results.unwrap_or(usize::MAX);
        units.into_iter().skip(skip).take(take).collect()
    }
}
