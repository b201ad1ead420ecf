//! Output of one collection cycle.

use serde::Serialize;

use crate::record::TaggedRecord;
use crate::state::LastRun;

/// Per-category counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub category_id: String,
    pub pages: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub malformed: usize,
}

/// A category that did not complete its cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryFailure {
    pub category_id: String,
    pub reason: String,
}

/// Everything one cycle hands back to the host.
///
/// `new_records` goes to the sink; `updated_state` is persisted only after
/// the sink accepted the records.
#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    /// Accepted records, grouped by category in configuration order.
    pub new_records: Vec<TaggedRecord>,
    pub updated_state: LastRun,
    pub failures: Vec<CategoryFailure>,
    pub stats: Vec<CategoryStats>,
}

impl CollectionResult {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Records collected for a single category, in arrival order.
    pub fn records_for<'a>(&'a self, category_id: &'a str) -> impl Iterator<Item = &'a TaggedRecord> {
        self.new_records
            .iter()
            .filter(move |r| r.category == category_id)
    }
}
