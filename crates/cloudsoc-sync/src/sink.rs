//! Downstream delivery of collected records.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use cloudsoc_core::TaggedRecord;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SinkError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("collector returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where collected records go. Delivery retries are the sink's concern.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver `records`, returning how many were accepted.
    async fn send(&self, records: &[TaggedRecord]) -> Result<usize, SinkError>;
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    async fn send(&self, records: &[TaggedRecord]) -> Result<usize, SinkError> {
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for tagged in records {
            serde_json::to_writer(&mut *out, &tagged.record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(records.len())
    }
}

#[cfg(feature = "http")]
pub use http_sink::{HttpSink, HttpSinkBuilder};

#[cfg(feature = "http")]
mod http_sink {
    use super::*;

    use std::time::Duration;

    pub struct HttpSinkBuilder {
        url: String,
        vendor: String,
        product: String,
        timeout: Duration,
        insecure: bool,
        proxy: Option<String>,
    }

    impl HttpSinkBuilder {
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

        pub fn build(self) -> Result<HttpSink, SinkError> {
            let mut builder = reqwest::Client::builder()
                .timeout(self.timeout)
                .danger_accept_invalid_certs(self.insecure);
            if let Some(proxy) = &self.proxy {
                builder = builder.proxy(reqwest::Proxy::all(proxy)?);
            }
            Ok(HttpSink {
                client: builder.build()?,
                url: self.url,
                vendor: self.vendor,
                product: self.product,
            })
        }
    }

    /// POSTs records as a JSON array to an ingestion endpoint.
    pub struct HttpSink {
        client: reqwest::Client,
        url: String,
        vendor: String,
        product: String,
    }

    impl HttpSink {
        /// Start building a sink for `url`. Requests time out after 30s
        /// unless overridden.
        pub fn builder(
            url: impl Into<String>,
            vendor: impl Into<String>,
            product: impl Into<String>,
        ) -> HttpSinkBuilder {
            HttpSinkBuilder {
                url: url.into(),
                vendor: vendor.into(),
                product: product.into(),
                timeout: Duration::from_secs(30),
                insecure: false,
                proxy: None,
            }
        }
    }

    #[async_trait]
    impl EventSink for HttpSink {
        async fn send(&self, records: &[TaggedRecord]) -> Result<usize, SinkError> {
            if records.is_empty() {
                return Ok(0);
            }
            let body: Vec<_> = records.iter().map(|t| &t.record).collect();

            info!(url = %self.url, count = records.len(), "pushing events to collector");
            let resp = self
                .client
                .post(&self.url)
                .query(&[("vendor", &self.vendor), ("product", &self.product)])
                .json(&body)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SinkError::Server {
                    status: status.as_u16(),
                    body,
                });
            }

            info!(accepted = records.len(), "push complete");
            Ok(records.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudsoc_core::RawRecord;
    use serde_json::json;
    use std::time::Duration;

    fn tagged(id: &str) -> TaggedRecord {
        TaggedRecord {
            category: "Incident_logs".into(),
            record: RawRecord::from(json!({"_id": id})),
        }
    }

    #[tokio::test]
    async fn json_lines_one_record_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        let sent = sink.send(&[tagged("1"), tagged("2")]).await.unwrap();
        assert_eq!(sent, 2);
        let written = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(written, "{\"_id\":\"1\"}\n{\"_id\":\"2\"}\n");
    }

    #[tokio::test]
    async fn http_sink_posts_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ingest")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("vendor".into(), "symantec".into()),
                mockito::Matcher::UrlEncoded("product".into(), "cloud_soc".into()),
            ]))
            .match_body(mockito::Matcher::Json(json!([{"_id": "1"}, {"_id": "2"}])))
            .with_status(202)
            .create_async()
            .await;

        let sink = HttpSink::builder(format!("{}/ingest", server.url()), "symantec", "cloud_soc")
            .build()
            .unwrap();
        let sent = sink.send(&[tagged("1"), tagged("2")]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn http_sink_skips_empty_batches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ingest")
            .expect(0)
            .create_async()
            .await;

        let sink = HttpSink::builder(format!("{}/ingest", server.url()), "v", "p")
            .build()
            .unwrap();
        assert_eq!(sink.send(&[]).await.unwrap(), 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_sink_surfaces_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ingest")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body("bad request")
            .create_async()
            .await;

        let sink = HttpSink::builder(format!("{}/ingest", server.url()), "v", "p")
            .build()
            .unwrap();
        let err = sink.send(&[tagged("1")]).await.unwrap_err();
        assert!(matches!(err, SinkError::Server { status: 400, .. }));
    }

    #[tokio::test]
    async fn http_sink_gives_up_on_a_stalled_collector() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept the connection and never answer.
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let sink = HttpSink::builder(format!("http://{addr}/ingest"), "v", "p")
            .with_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), sink.send(&[tagged("1")]))
            .await
            .expect("sink should time out on its own")
            .unwrap_err();

        assert!(matches!(err, SinkError::Http(ref e) if e.is_timeout()));
    }
}
