//! Collection engine: page fetching, deduplication, per-category pagination,
//! cycle orchestration, and delivery sinks.

pub mod collector;
pub mod dedup;
pub mod fetch;
pub mod orchestrator;
pub mod sink;

#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
mod testing;

pub use collector::{CategoryCollector, CategoryOutcome, CollectError, MAX_PAGE_SIZE};
pub use dedup::{DedupOutcome, Deduplicator};
pub use fetch::{FetchError, Page, PageFetcher, PageRequest};
pub use orchestrator::{CollectionOrchestrator, CycleSettings, DEFAULT_MAX_FETCH};
pub use sink::{EventSink, JsonLinesSink, SinkError};

#[cfg(feature = "http")]
pub use http::{CloudSocClient, Credentials};
#[cfg(feature = "http")]
pub use sink::{HttpSink, HttpSinkBuilder};
