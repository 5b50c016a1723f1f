//! Feed sources: the NVD CVE API 2.0 and local feed files.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use super::feed::{nvd2_entry, parse_document, FeedBatch};
use crate::error::IngestError;

pub const NVD_API_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// Largest page the NVD API serves.
pub const MAX_RESULTS_PER_PAGE: u32 = 2000;

/// Longest `lastModStartDate`..`lastModEndDate` window the API accepts.
pub const MAX_WINDOW_DAYS: i64 = 120;

/// Somewhere vulnerability entries can be fetched from.
///
/// A fetch either returns every entry of the batch or fails as a whole;
/// callers never see a partial batch.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<FeedBatch, IngestError>;
}

/// Paginated client for the NVD CVE API 2.0.
pub struct NvdApiFeed {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    results_per_page: u32,
    /// Delay between page requests (NVD rate limiting)
    request_delay: Duration,
    modified_since: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl NvdApiFeed {
    /// Builds a client; `timeout` bounds each HTTP request.
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, IngestError> {
        let request_delay = if api_key.is_some() {
            Duration::from_millis(600) // 50 requests per 30s with a key
        } else {
            Duration::from_secs(6) // 5 requests per 30s without
        };

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pkgaudit/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            results_per_page: MAX_RESULTS_PER_PAGE,
            request_delay,
            modified_since: None,
        })
    }

    pub fn with_results_per_page(mut self, results_per_page: u32) -> Self {
        self.results_per_page = results_per_page.clamp(1, MAX_RESULTS_PER_PAGE);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Restricts the fetch to CVEs modified between `since` and `until`.
    pub fn modified_between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.modified_since = Some((since, until));
        self
    }

    /// Splits the modification window into chunks the API accepts.
    fn windows(&self) -> Vec<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let Some((since, until)) = self.modified_since else {
            return vec![None];
        };

        let mut windows = Vec::new();
        let mut start = since;
        while start < until {
            let end = (start + ChronoDuration::days(MAX_WINDOW_DAYS)).min(until);
            windows.push(Some((start, end)));
            start = end;
        }
        windows
    }

    async fn fetch_page(
        &self,
        start_index: u32,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<NvdPage, IngestError> {
        let mut query = vec![
            ("startIndex", start_index.to_string()),
            ("resultsPerPage", self.results_per_page.to_string()),
        ];
        if let Some((since, until)) = window {
            query.push(("lastModStartDate", since.to_rfc3339_opts(SecondsFormat::Millis, true)));
            query.push(("lastModEndDate", until.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }

        debug!("Fetching CVEs from {} at index {}", self.api_url, start_index);

        let mut request = self.client.get(&self.api_url).query(&query);
        if let Some(ref key) = self.api_key {
            request = request.header("apiKey", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(IngestError::Status {
                status: response.status().as_u16(),
                url: self.api_url.clone(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| IngestError::Envelope(format!("unexpected NVD response: {}", e)))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdPage {
    total_results: u32,
    #[serde(default)]
    vulnerabilities: Vec<Value>,
}

#[async_trait]
impl FeedSource for NvdApiFeed {
    fn describe(&self) -> String {
        match self.modified_since {
            Some((since, _)) => format!("{} (modified since {})", self.api_url, since.format("%Y-%m-%d")),
            None => self.api_url.clone(),
        }
    }

    async fn fetch(&self) -> Result<FeedBatch, IngestError> {
        let mut batch = FeedBatch::default();
        let mut first_request = true;

        for window in self.windows() {
            let mut start_index = 0;
            loop {
                if !first_request {
                    tokio::time::sleep(self.request_delay).await;
                }
                first_request = false;

                let page = self.fetch_page(start_index, window).await?;
                let received = page.vulnerabilities.len() as u32;
                batch.entries.extend(
                    page.vulnerabilities
                        .iter()
                        .enumerate()
                        .map(|(i, value)| nvd2_entry(value, start_index as usize + i)),
                );
                start_index += received;

                info!(
                    "Fetched {}/{} CVEs",
                    start_index.min(page.total_results),
                    page.total_results
                );

                if received == 0 || start_index >= page.total_results {
                    break;
                }
            }
        }

        Ok(batch)
    }
}

/// Feed documents stored on disk: NVD 2.0 pages, NVD 1.1 feeds, or a
/// persisted corpus file.
pub struct FileFeed {
    paths: Vec<PathBuf>,
}

impl FileFeed {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl FeedSource for FileFeed {
    fn describe(&self) -> String {
        let names: Vec<String> = self.paths.iter().map(|p| p.display().to_string()).collect();
        names.join(", ")
    }

    async fn fetch(&self) -> Result<FeedBatch, IngestError> {
        let mut batch = FeedBatch::default();
        for path in &self.paths {
            let payload = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| IngestError::Io {
                    path: path.clone(),
                    source,
                })?;
            let parsed = parse_document(&payload)?;
            debug!("{}: {} entries", path.display(), parsed.len());
            batch.extend(parsed);
        }
        Ok(batch)
    }
}
