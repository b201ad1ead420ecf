//! Timestamp/id deduplication against a category's resumption state.
//!
//! Upstream timestamps are coarser than event order, and every cycle
//! re-queries from the boundary timestamp inclusively, so the first records
//! of each batch are usually ones we already delivered. A record is
//! classified by comparing its timestamp with the boundary:
//!
//! - equal: new only if its id is not already in the boundary id set
//! - newer: always new; the newest timestamp seen becomes the next boundary
//! - older: stale, skipped (the upstream query should never return these)
//!
//! Records missing an id or a parseable timestamp are skipped and counted
//! as malformed; they are neither new nor duplicates.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use cloudsoc_core::{
    LogCategory, RawRecord, RecordError, ResumptionState, TimestampError, parse_timestamp,
};
use tracing::warn;

/// Result of deduplicating one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    /// Accepted records, in batch order.
    pub records: Vec<RawRecord>,
    /// Resumption state after this batch.
    pub state: ResumptionState,
    pub duplicates: usize,
    pub stale: usize,
    pub malformed: usize,
}

/// Highest timestamp accepted so far in the batch, with the ids at it.
struct Newest {
    at: DateTime<Utc>,
    raw: String,
    ids: BTreeSet<String>,
}

/// Deduplicates batches for one category.
pub struct Deduplicator<'a> {
    category: &'a LogCategory,
}

impl<'a> Deduplicator<'a> {
    pub fn new(category: &'a LogCategory) -> Self {
        Self { category }
    }

    /// Return the genuinely new records of `batch` and the next state.
    ///
    /// Processing stops as soon as `budget` records have been accepted;
    /// the rest of the batch is left for the next cycle, which re-derives
    /// it from the (unadvanced) boundary. `prior` is never modified.
    ///
    /// Fails only if `prior` carries an unparseable boundary timestamp.
    pub fn dedup(
        &self,
        prior: &ResumptionState,
        batch: Vec<RawRecord>,
        budget: usize,
    ) -> Result<DedupOutcome, TimestampError> {
        let boundary = prior.last_seen().map(parse_timestamp).transpose()?;
        let mut boundary_ids = prior.seen_ids_at_boundary.clone();
        let mut newest: Option<Newest> = None;
        let mut outcome = DedupOutcome::default();

        for record in batch {
            if outcome.records.len() >= budget {
                break;
            }

            let (id, at, raw) = match self.identify(&record) {
                Ok(v) => v,
                Err(e) => {
                    warn!(category = %self.category.id, error = %e, "skipping malformed record");
                    outcome.malformed += 1;
                    continue;
                }
            };

            match boundary.map(|b| at.cmp(&b)) {
                Some(Ordering::Less) => {
                    warn!(category = %self.category.id, id = %id, timestamp = %raw, "skipping record older than boundary");
                    outcome.stale += 1;
                    continue;
                }
                Some(Ordering::Equal) => {
                    if !boundary_ids.insert(id) {
                        outcome.duplicates += 1;
                        continue;
                    }
                }
                Some(Ordering::Greater) | None => match newest.as_mut() {
                    Some(n) if at < n.at => {}
                    Some(n) if at == n.at => {
                        if !n.ids.insert(id) {
                            outcome.duplicates += 1;
                            continue;
                        }
                    }
                    _ => {
                        newest = Some(Newest {
                            at,
                            raw,
                            ids: BTreeSet::from([id]),
                        });
                    }
                },
            }

            outcome.records.push(record);
        }

        outcome.state = match newest {
            Some(n) => ResumptionState {
                last_seen_timestamp: n.raw,
                seen_ids_at_boundary: n.ids,
            },
            None => ResumptionState {
                last_seen_timestamp: prior.last_seen_timestamp.clone(),
                seen_ids_at_boundary: boundary_ids,
            },
        };
        Ok(outcome)
    }

    fn identify(&self, record: &RawRecord) -> Result<(String, DateTime<Utc>, String), RecordError> {
        let id = record.id(&self.category.id_field)?;
        let raw = record.timestamp(&self.category.timestamp_field)?;
        let at = parse_timestamp(raw).map_err(|_| RecordError::BadTimestamp(raw.to_string()))?;
        Ok((id, at, raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{category, ids, rec};

    const T: &str = "2024-05-01T10:00:00";
    const T1: &str = "2024-05-01T10:00:01";
    const T2: &str = "2024-05-01T10:00:02";

    fn state(ts: &str, seen: &[&str]) -> ResumptionState {
        ResumptionState {
            last_seen_timestamp: ts.into(),
            seen_ids_at_boundary: seen.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn boundary_batch() -> Vec<RawRecord> {
        vec![rec("a", T), rec("b", T), rec("c", T1)]
    }

    #[test]
    fn boundary_correctness() {
        let cat = category("logs");
        let out = Deduplicator::new(&cat)
            .dedup(&state(T, &["a"]), boundary_batch(), usize::MAX)
            .unwrap();
        assert_eq!(ids(&out.records), ["b", "c"]);
        assert_eq!(out.state, state(T1, &["c"]));
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn budget_truncation_keeps_boundary() {
        let cat = category("logs");
        let out = Deduplicator::new(&cat)
            .dedup(&state(T, &["a"]), boundary_batch(), 1)
            .unwrap();
        assert_eq!(ids(&out.records), ["b"]);
        assert_eq!(out.state, state(T, &["a", "b"]));
    }

    #[test]
    fn refetch_of_same_batch_is_empty() {
        let cat = category("logs");
        let dedup = Deduplicator::new(&cat);
        let first = dedup.dedup(&state(T, &[]), boundary_batch(), usize::MAX).unwrap();
        assert_eq!(first.records.len(), 3);
        let second = dedup.dedup(&first.state, boundary_batch(), usize::MAX).unwrap();
        assert!(second.records.is_empty());
        assert_eq!(second.state, first.state);
    }

    #[test]
    fn empty_batch_leaves_state_unchanged() {
        let cat = category("logs");
        let prior = state(T, &["a"]);
        let out = Deduplicator::new(&cat).dedup(&prior, Vec::new(), 10).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.state, prior);
    }

    #[test]
    fn zero_budget_accepts_nothing() {
        let cat = category("logs");
        let prior = state(T, &[]);
        let out = Deduplicator::new(&cat).dedup(&prior, boundary_batch(), 0).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.state, prior);
    }

    #[test]
    fn boundary_ids_collected_at_max_timestamp_only() {
        let cat = category("logs");
        let batch = vec![rec("a", T1), rec("b", T2), rec("c", T2)];
        let out = Deduplicator::new(&cat).dedup(&state(T, &["x"]), batch, 10).unwrap();
        assert_eq!(ids(&out.records), ["a", "b", "c"]);
        assert_eq!(out.state, state(T2, &["b", "c"]));
    }

    #[test]
    fn stale_and_malformed_are_skipped() {
        let cat = category("logs");
        let batch = vec![
            rec("old", "2024-05-01T09:59:59"),
            RawRecord::from(serde_json::json!({"ts": T1})),
            RawRecord::from(serde_json::json!({"_id": "nots"})),
            rec("bad", "not a time"),
            rec("ok", T1),
        ];
        let out = Deduplicator::new(&cat).dedup(&state(T, &[]), batch, 10).unwrap();
        assert_eq!(ids(&out.records), ["ok"]);
        assert_eq!(out.stale, 1);
        assert_eq!(out.malformed, 3);
        assert_eq!(out.duplicates, 0);
    }

    #[test]
    fn malformed_records_do_not_consume_budget() {
        let cat = category("logs");
        let batch = vec![rec("bad", "nope"), rec("a", T1)];
        let out = Deduplicator::new(&cat).dedup(&state(T, &[]), batch, 1).unwrap();
        assert_eq!(ids(&out.records), ["a"]);
    }

    #[test]
    fn repeated_id_within_newer_second_is_duplicate() {
        let cat = category("logs");
        let batch = vec![rec("a", T1), rec("a", T1)];
        let out = Deduplicator::new(&cat).dedup(&state(T, &[]), batch, 10).unwrap();
        assert_eq!(ids(&out.records), ["a"]);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn boundary_matches_by_instant_not_text() {
        let cat = category("logs");
        let batch = vec![rec("a", "2024-05-01T10:00:00Z"), rec("b", T)];
        let out = Deduplicator::new(&cat).dedup(&state(T, &["a"]), batch, 10).unwrap();
        assert_eq!(ids(&out.records), ["b"]);
        assert_eq!(out.state, state(T, &["a", "b"]));
    }

    #[test]
    fn no_prior_boundary_accepts_everything() {
        let cat = category("logs");
        let out = Deduplicator::new(&cat)
            .dedup(&ResumptionState::default(), boundary_batch(), 10)
            .unwrap();
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.state, state(T1, &["c"]));
    }

    #[test]
    fn unparseable_prior_boundary_is_an_error() {
        let cat = category("logs");
        let err = Deduplicator::new(&cat)
            .dedup(&state("garbage", &[]), boundary_batch(), 10)
            .unwrap_err();
        assert_eq!(err, TimestampError("garbage".into()));
    }

    #[test]
    fn prior_state_is_not_mutated() {
        let cat = category("logs");
        let prior = state(T, &["a"]);
        let snapshot = prior.clone();
        let _ = Deduplicator::new(&cat).dedup(&prior, boundary_batch(), 10).unwrap();
        assert_eq!(prior, snapshot);
    }

    #[test]
    fn chained_batches_never_repeat_an_id() {
        let cat = category("logs");
        let dedup = Deduplicator::new(&cat);
        // Overlapping windows as the upstream would serve them on successive
        // cycles, each starting at the previous boundary.
        let windows = [
            vec![rec("1", T), rec("2", T)],
            vec![rec("1", T), rec("2", T), rec("3", T), rec("4", T1)],
            vec![rec("4", T1), rec("5", T1), rec("6", T2)],
            vec![rec("6", T2)],
        ];
        let mut state = ResumptionState::seeded(T);
        let mut delivered = Vec::new();
        for window in windows {
            let out = dedup.dedup(&state, window, usize::MAX).unwrap();
            delivered.extend(ids(&out.records));
            state = out.state;
        }
        assert_eq!(delivered, ["1", "2", "3", "4", "5", "6"]);
    }
}
