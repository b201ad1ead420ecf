//! The page-fetch capability the collector drives.

use async_trait::async_trait;
use cloudsoc_core::{LogCategory, RawRecord};
use thiserror::Error;

/// A transient failure fetching one page. Scoped to the category it hit.
#[derive(Error, Debug)]
pub enum FetchError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid request URL: {0}")]
    Url(String),
}

impl FetchError {
    /// Whether the upstream rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Server { status: 401 | 403, .. })
    }
}

/// Parameters for a single page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub category: &'a LogCategory,
    /// Inclusive lower bound on the category's timestamp field.
    pub lower_bound: &'a str,
    /// Opaque token from the previous page; `None` for the first page.
    pub continuation: Option<&'a str>,
    /// Maximum records the upstream should return in this page.
    pub limit: usize,
}

/// One page of upstream records.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Ascending by timestamp.
    pub records: Vec<RawRecord>,
    /// Present while more pages exist for the same lower bound.
    pub continuation: Option<String>,
}

/// Source of paginated records.
///
/// Implementations must return each page ascending by timestamp and must
/// return no continuation once pagination for the lower bound is exhausted.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: PageRequest<'_>) -> Result<Page, FetchError>;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    async fn fetch(&self, request: PageRequest<'_>) -> Result<Page, FetchError> {
        (**self).fetch(request).await
    }
}
