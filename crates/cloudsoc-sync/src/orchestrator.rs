//! One collection cycle across every configured category.

use chrono::{DateTime, Utc};
use cloudsoc_core::{
    CategoryFailure, CollectionResult, DEFAULT_FIRST_FETCH, LastRun, LogCategory, TaggedRecord,
};
use futures::future::join_all;
use tracing::{debug, error, info};

use crate::collector::{CategoryCollector, MAX_PAGE_SIZE};
use crate::fetch::PageFetcher;

/// Default per-category record budget for one cycle.
pub const DEFAULT_MAX_FETCH: usize = 1000;

/// Knobs for a collection cycle.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Record cap per category per cycle, unless the category overrides it.
    pub max_fetch: usize,
    /// First-fetch expression for categories without state.
    pub first_fetch: String,
    /// Records requested per page, capped at [`MAX_PAGE_SIZE`].
    pub page_size: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            max_fetch: DEFAULT_MAX_FETCH,
            first_fetch: DEFAULT_FIRST_FETCH.to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Runs every category's collector and merges the results.
///
/// Stateless between runs: the prior [`LastRun`] comes in as an argument
/// and the next one goes out in the [`CollectionResult`]. Persisting it is
/// the caller's job.
pub struct CollectionOrchestrator<F> {
    fetcher: F,
    settings: CycleSettings,
    now: Option<DateTime<Utc>>,
}

impl<F: PageFetcher> CollectionOrchestrator<F> {
    pub fn new(fetcher: F, settings: CycleSettings) -> Self {
        Self {
            fetcher,
            settings,
            now: None,
        }
    }

    /// Pin the clock used to resolve relative first-fetch expressions.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    #[cfg(test)]
    pub(crate) fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Run one cycle.
    ///
    /// Categories are collected concurrently; a failure in one never blocks
    /// or aborts another. Results are merged in configuration order.
    pub async fn run(&self, categories: &[LogCategory], prior: &LastRun) -> CollectionResult {
        let now = self.now.unwrap_or_else(Utc::now);
        let collector = CategoryCollector::new(&self.fetcher)
            .with_first_fetch(self.settings.first_fetch.clone())
            .with_page_size(self.settings.page_size)
            .with_now(now);

        let outcomes = join_all(categories.iter().map(|category| {
            collector.collect(
                category,
                prior.get(&category.id),
                category.budget(self.settings.max_fetch),
            )
        }))
        .await;

        let mut result = CollectionResult::default();
        for (category, outcome) in categories.iter().zip(outcomes) {
            if let Some(state) = outcome.state {
                result.updated_state.insert(category.id.clone(), state);
            }
            if let Some(e) = outcome.error {
                error!(category = %category.id, error = %e, "category failed this cycle");
                result.failures.push(CategoryFailure {
                    category_id: category.id.clone(),
                    reason: e.to_string(),
                });
            }
            result
                .new_records
                .extend(outcome.records.into_iter().map(|record| TaggedRecord {
                    category: category.id.clone(),
                    record,
                }));
            result.stats.push(outcome.stats);
        }

        // Unconfigured categories keep their last-run entry.
        for (id, state) in prior.iter() {
            if !categories.iter().any(|c| &c.id == id) {
                debug!(category = %id, "carrying forward state of unconfigured category");
                result.updated_state.insert(id.clone(), state.clone());
            }
        }

        info!(
            records = result.new_records.len(),
            categories = categories.len(),
            failed = result.failures.len(),
            "collection cycle complete"
        );
        result
    }
}
