//! Scheduled collection: read state, collect, deliver, then persist state.

use std::time::Instant;

use anyhow::Context;
use cloudsoc_core::{CollectionResult, LogCategory};
use cloudsoc_store::StateStore;
use cloudsoc_sync::{CollectionOrchestrator, EventSink, PageFetcher};

#[derive(Debug)]
pub struct CycleReport {
    pub result: CollectionResult,
    pub delivered: usize,
    pub elapsed_secs: f64,
}

impl CycleReport {
    /// True when categories were configured and none of them completed.
    pub fn all_failed(&self, configured: usize) -> bool {
        configured > 0 && self.result.failures.len() == configured
    }
}

/// Run one scheduled cycle.
///
/// State is saved only after the sink accepted the records, so a failed
/// delivery re-collects the same window next time.
pub async fn run_fetch_cycle<F: PageFetcher>(
    orchestrator: &CollectionOrchestrator<F>,
    categories: &[LogCategory],
    store: &StateStore,
    sink: &dyn EventSink,
) -> anyhow::Result<CycleReport> {
    let start = Instant::now();

    let prior = store
        .load()
        .with_context(|| format!("reading state from {}", store.path().display()))?;

    let result = orchestrator.run(categories, &prior).await;
    for failure in &result.failures {
        eprintln!("  {} failed: {}", failure.category_id, failure.reason);
    }

    let delivered = sink
        .send(&result.new_records)
        .await
        .context("delivering events")?;

    store
        .save(&result.updated_state)
        .with_context(|| format!("writing state to {}", store.path().display()))?;

    Ok(CycleReport {
        result,
        delivered,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}
