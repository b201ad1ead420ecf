//! HTTP page fetcher for the Cloud SOC log API.

use std::time::Duration;

use async_trait::async_trait;
use cloudsoc_core::{LogCategory, RawRecord, format_timestamp};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info};

use crate::collector::MAX_PAGE_SIZE;
use crate::fetch::{FetchError, Page, PageFetcher, PageRequest};

/// Path of the log retrieval endpoint, relative to the tenant URL.
pub const LOGS_PATH: &str = "/api/admin/v1/logs/get/";

const DB_RESOLVED_HEADER: &str = "x-elastica-dbname-resolved";

#[derive(Deserialize)]
struct LogsResponse {
    #[serde(default)]
    logs: Option<Vec<RawRecord>>,
    #[serde(default)]
    next_url: Option<String>,
}

/// Key id and secret issued by the Cloud SOC admin console.
#[derive(Clone)]
pub struct Credentials {
    pub key_id: String,
    pub key_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

pub struct CloudSocClientBuilder {
    base_url: String,
    credentials: Credentials,
    timeout: Duration,
    insecure: bool,
    proxy: Option<String>,
}

impl CloudSocClientBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Skip TLS certificate verification.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn build(self) -> Result<CloudSocClient, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(DB_RESOLVED_HEADER),
            HeaderValue::from_static("True"),
        );

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(self.insecure);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(CloudSocClient {
            client: builder.build()?,
            endpoint: format!("{}{}", self.base_url.trim_end_matches('/'), LOGS_PATH),
            credentials: self.credentials,
        })
    }
}

/// HTTP client for the Cloud SOC log endpoint.
pub struct CloudSocClient {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl CloudSocClient {
    /// Start building a client for the given tenant URL.
    ///
    /// `base_url` should be like `https://app.elastica.net` (trailing slash optional).
    pub fn builder(base_url: impl Into<String>, credentials: Credentials) -> CloudSocClientBuilder {
        CloudSocClientBuilder {
            base_url: base_url.into(),
            credentials,
            timeout: Duration::from_secs(30),
            insecure: false,
            proxy: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch a single record per category to verify reachability and
    /// credentials. Use [`FetchError::is_auth`] to tell bad keys apart.
    pub async fn test_connection(&self, categories: &[LogCategory]) -> Result<(), FetchError> {
        let now = format_timestamp(chrono::Utc::now());
        for category in categories {
            debug!(category = %category.id, "testing connectivity");
            self.fetch(PageRequest {
                category,
                lower_bound: &now,
                continuation: None,
                limit: 1,
            })
            .await?;
        }
        Ok(())
    }

    async fn get(&self, request: reqwest::RequestBuilder) -> Result<Page, FetchError> {
        let resp = request
            .basic_auth(&self.credentials.key_id, Some(&self.credentials.key_secret))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed: LogsResponse = serde_json::from_str(&body)?;
        Ok(Page {
            records: parsed.logs.unwrap_or_default(),
            continuation: parsed.next_url.filter(|u| !u.is_empty()),
        })
    }
}

#[async_trait]
impl PageFetcher for CloudSocClient {
    async fn fetch(&self, request: PageRequest<'_>) -> Result<Page, FetchError> {
        let builder = match request.continuation {
            // The upstream hands back a complete URL for the next page.
            Some(next_url) => {
                let url = reqwest::Url::parse(next_url)
                    .map_err(|e| FetchError::Url(format!("{next_url}: {e}")))?;
                debug!(category = %request.category.id, url = %url, "requesting next page");
                self.client.get(url)
            }
            None => {
                let mut params: Vec<(&str, String)> = request
                    .category
                    .selector
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.clone()))
                    .collect();
                params.push(("limit", request.limit.clamp(1, MAX_PAGE_SIZE).to_string()));
                params.push((
                    request.category.lower_bound_param.as_str(),
                    request.lower_bound.to_string(),
                ));
                debug!(category = %request.category.id, params = ?params, "requesting first page");
                self.client.get(&self.endpoint).query(&params)
            }
        };

        let page = self.get(builder).await?;
        info!(
            category = %request.category.id,
            count = page.records.len(),
            more = page.continuation.is_some(),
            "pulled logs"
        );
        Ok(page)
    }
}
