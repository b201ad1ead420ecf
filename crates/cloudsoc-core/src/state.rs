//! Resumption state ("last run") persisted between collection cycles.
//!
//! Upstream timestamps only have second granularity, so a timestamp alone
//! cannot tell an already-delivered record from a new one that landed in
//! the same second. Each category therefore keeps the boundary timestamp
//! plus the ids already delivered *at exactly that timestamp*. Ids from
//! older seconds are never needed again and are dropped whenever the
//! boundary advances.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Per-category resumption state.
///
/// Invariant: every id in `seen_ids_at_boundary` belongs to a delivered
/// record whose timestamp equals `last_seen_timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResumptionState {
    #[serde(default)]
    pub last_seen_timestamp: String,
    #[serde(default)]
    pub seen_ids_at_boundary: BTreeSet<String>,
}

impl ResumptionState {
    /// State for a category that has never delivered anything, anchored at
    /// its first-fetch lower bound.
    pub fn seeded(lower_bound: impl Into<String>) -> Self {
        Self {
            last_seen_timestamp: lower_bound.into(),
            seen_ids_at_boundary: BTreeSet::new(),
        }
    }

    /// The boundary timestamp, if one has been established.
    pub fn last_seen(&self) -> Option<&str> {
        let ts = self.last_seen_timestamp.trim();
        (!ts.is_empty()).then_some(ts)
    }
}

/// The full persisted map: category id to resumption state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LastRun(pub BTreeMap<String, ResumptionState>);

impl LastRun {
    pub fn get(&self, category_id: &str) -> Option<&ResumptionState> {
        self.0.get(category_id)
    }

    pub fn insert(&mut self, category_id: impl Into<String>, state: ResumptionState) {
        self.0.insert(category_id.into(), state);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResumptionState)> {
        self.0.iter()
    }
}
