//! Fetching the exporter payload over HTTP.

use crate::parser::parse_with_diagnostics;
use crate::snapshot::MetricsSnapshot;
use async_trait::async_trait;
use common::{Error, Result};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Source of metrics snapshots
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Scrape the exporter listening on `host:port`
    async fn fetch(&self, host: &str, port: u16) -> Result<MetricsSnapshot>;
}

/// Plain HTTP scraper for the exporter endpoint
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a new fetcher.
    ///
    /// Without a timeout the HTTP client defaults apply.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// URL of the exporter endpoint
    pub fn endpoint(host: &str, port: u16) -> String {
        if host.contains(':') && !host.starts_with('[') {
            format!("http://[{}]:{}/", host, port)
        } else {
            format!("http://{}:{}/", host, port)
        }
    }

    /// Fetch the raw payload text
    pub async fn fetch_raw(&self, host: &str, port: u16) -> Result<String> {
        let url = Self::endpoint(host, port);
        let start = Instant::now();

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Metrics request failed");
            Error::network(format!("request to {} failed: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Unexpected status from exporter");
            return Err(Error::network(format!(
                "{} answered with status {}",
                url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("failed to read body from {}: {}", url, e)))?;

        debug!(url = %url, bytes = body.len(), duration_ms = start.elapsed().as_millis(), "Metrics fetched");
        Ok(body)
    }
}

#[async_trait]
impl MetricsSource for HttpFetcher {
    async fn fetch(&self, host: &str, port: u16) -> Result<MetricsSnapshot> {
        let body = self.fetch_raw(host, port).await?;
        let (snapshot, diagnostics) = parse_with_diagnostics(&body);
        for diagnostic in &diagnostics {
            debug!(line = diagnostic.line, error = %diagnostic.error, "Dropped metrics line");
        }
        if !diagnostics.is_empty() {
            debug!(dropped = diagnostics.len(), "Some metrics lines were dropped");
        }
        Ok(snapshot)
    }
}
