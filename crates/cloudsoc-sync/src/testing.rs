//! Shared fixtures for the engine's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use cloudsoc_core::{LogCategory, RawRecord};
use serde_json::json;

use crate::fetch::{FetchError, Page, PageFetcher, PageRequest};

pub fn category(id: &str) -> LogCategory {
    LogCategory {
        id: id.into(),
        selector: Default::default(),
        timestamp_field: "ts".into(),
        id_field: "_id".into(),
        lower_bound_param: "created_timestamp".into(),
        event_label: Some(format!("{id} event")),
        first_fetch: None,
        max_lookback_days: None,
        max_fetch: None,
    }
}

pub fn rec(id: &str, ts: &str) -> RawRecord {
    RawRecord::from(json!({"_id": id, "ts": ts}))
}

pub fn ids(records: &[RawRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.id("_id").unwrap_or_default())
        .collect()
}

pub fn page(records: Vec<RawRecord>, next: Option<&str>) -> Result<Page, FetchError> {
    Ok(Page {
        records,
        continuation: next.map(str::to_string),
    })
}

pub fn outage() -> Result<Page, FetchError> {
    Err(FetchError::Server {
        status: 503,
        body: "unavailable".into(),
    })
}

/// A recorded fetch call: (category, lower bound, continuation).
pub type Call = (String, String, Option<String>);

/// Serves pre-scripted pages per category and records every call.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: Mutex<HashMap<String, VecDeque<Result<Page, FetchError>>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, category: &str, pages: Vec<Result<Page, FetchError>>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(category.to_string(), pages.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, category: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|(c, _, _)| c == category)
            .collect()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, request: PageRequest<'_>) -> Result<Page, FetchError> {
        self.calls.lock().unwrap().push((
            request.category.id.clone(),
            request.lower_bound.to_string(),
            request.continuation.map(str::to_string),
        ));
        self.pages
            .lock()
            .unwrap()
            .get_mut(&request.category.id)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| page(Vec::new(), None))
    }
}
