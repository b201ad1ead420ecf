//! Pagination driver for a single log category.

use chrono::{DateTime, Utc};
use cloudsoc_core::{
    CategoryStats, ConfigError, DEFAULT_FIRST_FETCH, LogCategory, RawRecord, ResumptionState,
    first_fetch_lower_bound, parse_timestamp,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::dedup::Deduplicator;
use crate::fetch::{FetchError, PageFetcher, PageRequest};

/// Upstream limit on records per page.
pub const MAX_PAGE_SIZE: usize = 1000;

/// A failure confined to one category's cycle.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("fetching page {page} failed: {source}")]
    Fetch {
        page: usize,
        #[source]
        source: FetchError,
    },
}

/// What one category's cycle produced.
///
/// On failure, `records` and `state` still hold everything accepted before
/// the failing page, so delivered records and persisted state never diverge.
#[derive(Debug)]
pub struct CategoryOutcome {
    pub records: Vec<RawRecord>,
    /// `None` only when no lower bound could be established and there was
    /// no prior state to carry.
    pub state: Option<ResumptionState>,
    pub stats: CategoryStats,
    pub error: Option<CollectError>,
}

/// Drives a [`PageFetcher`] for one category until the budget or the
/// pages run out, deduplicating each page against the running state.
pub struct CategoryCollector<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    first_fetch: String,
    page_size: usize,
    now: Option<DateTime<Utc>>,
}

impl<'a, F: PageFetcher + ?Sized> CategoryCollector<'a, F> {
    pub fn new(fetcher: &'a F) -> Self {
        Self {
            fetcher,
            first_fetch: DEFAULT_FIRST_FETCH.to_string(),
            page_size: MAX_PAGE_SIZE,
            now: None,
        }
    }

    /// Global first-fetch expression for categories without state.
    pub fn with_first_fetch(mut self, expr: impl Into<String>) -> Self {
        self.first_fetch = expr.into();
        self
    }

    /// Records requested per page, capped at [`MAX_PAGE_SIZE`].
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Pin the clock used to resolve relative first-fetch expressions.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Collect up to `budget` new records for `category`.
    pub async fn collect(
        &self,
        category: &LogCategory,
        prior: Option<&ResumptionState>,
        budget: usize,
    ) -> CategoryOutcome {
        let mut outcome = CategoryOutcome {
            records: Vec::new(),
            state: prior.cloned(),
            stats: CategoryStats {
                category_id: category.id.clone(),
                ..Default::default()
            },
            error: None,
        };

        let mut state = match self.starting_state(category, prior) {
            Ok(state) => state,
            Err(e) => {
                error!(category = %category.id, error = %e, "cannot establish lower bound");
                outcome.error = Some(e.into());
                return outcome;
            }
        };
        // The lower bound stays fixed for the whole cycle; continuation
        // tokens are only valid for the query that produced them.
        let lower_bound = state.last_seen_timestamp.clone();
        let dedup = Deduplicator::new(category);
        let mut continuation: Option<String> = None;

        while outcome.records.len() < budget {
            let request = PageRequest {
                category,
                lower_bound: &lower_bound,
                continuation: continuation.as_deref(),
                limit: self.page_size,
            };
            let page = match self.fetcher.fetch(request).await {
                Ok(page) => page,
                Err(source) => {
                    let page = outcome.stats.pages + 1;
                    error!(category = %category.id, page, error = %source, "page fetch failed");
                    outcome.error = Some(CollectError::Fetch { page, source });
                    break;
                }
            };
            outcome.stats.pages += 1;
            debug!(
                category = %category.id,
                page = outcome.stats.pages,
                records = page.records.len(),
                more = page.continuation.is_some(),
                "fetched page"
            );

            let remaining = budget - outcome.records.len();
            let batch = match dedup.dedup(&state, page.records, remaining) {
                Ok(batch) => batch,
                Err(e) => {
                    outcome.error = Some(ConfigError::from(e).into());
                    break;
                }
            };
            outcome.stats.duplicates += batch.duplicates;
            outcome.stats.stale += batch.stale;
            outcome.stats.malformed += batch.malformed;
            outcome.records.extend(batch.records.into_iter().map(|mut r| {
                r.enrich(category);
                r
            }));
            state = batch.state;
            outcome.state = Some(state.clone());

            let next = page.continuation.filter(|t| !t.is_empty());
            if next.is_some() && next == continuation {
                warn!(category = %category.id, "upstream repeated its continuation token, stopping");
                break;
            }
            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        outcome.stats.accepted = outcome.records.len();
        info!(
            category = %category.id,
            accepted = outcome.stats.accepted,
            pages = outcome.stats.pages,
            duplicates = outcome.stats.duplicates,
            malformed = outcome.stats.malformed,
            "category collected"
        );
        outcome
    }

    /// The state to start deduplicating from: the prior state if it has a
    /// boundary, otherwise one seeded at the first-fetch lower bound.
    fn starting_state(
        &self,
        category: &LogCategory,
        prior: Option<&ResumptionState>,
    ) -> Result<ResumptionState, ConfigError> {
        if let Some(prior) = prior {
            if let Some(boundary) = prior.last_seen() {
                parse_timestamp(boundary)?;
                return Ok(ResumptionState {
                    last_seen_timestamp: boundary.to_string(),
                    seen_ids_at_boundary: prior.seen_ids_at_boundary.clone(),
                });
            }
        }
        let now = self.now.unwrap_or_else(Utc::now);
        let lower_bound = first_fetch_lower_bound(category, &self.first_fetch, now)?;
        debug!(category = %category.id, lower_bound = %lower_bound, "no prior state, using first fetch");
        Ok(ResumptionState::seeded(lower_bound))
    }
}
