//! Congress.gov v3 client.
//!
//! Every fetch path in the crate goes through [`ApiClient`]:
//! - `api_key` (when configured) and `format=json` are added to every request
//! - failures are retried by [`RetryStrategy`]; the final error is returned
//! - a fixed courtesy delay follows every successful request
//! - [`ApiClient::fetch_all_pages`] walks the `offset`/`limit` cursor
//!
//! # Retry Strategy
//!
//! - Network errors, timeouts, HTTP 408/429 and 5xx → retry
//! - Other HTTP 4xx → fail immediately (retrying a 404 cannot help)
//! - Delay before the next attempt: `base_delay * 2^attempt`
//! - After `max_retries` attempts the last error is returned

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::{SyncError, SyncResult};
use crate::payload;

/// Production API root; absolute sub-resource links are rebased from here
/// onto the configured base URL.
pub const UPSTREAM_BASE: &str = "https://api.congress.gov/v3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Total attempts per request.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryStrategy {
    /// Sleep after failed attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryStrategy,
    request_delay: Duration,
    page_limit: u32,
}

enum Attempt {
    Retry(String),
    Fatal(String),
}

impl ApiClient {
    /// Build a client reading the API key from the configured env var.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Self::with_api_key(config, config.api_key())
    }

    pub fn with_api_key(config: &ApiConfig, api_key: Option<String>) -> Result<Self> {
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "no Congress.gov API key configured; requests may be rejected"
            );
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("congress-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryStrategy {
                max_retries: config.max_retries,
                base_delay: config.base_delay(),
            },
            request_delay: config.request_delay(),
            page_limit: config.page_limit,
        })
    }

    /// Absolute URL for a path (`bill/118`) or an upstream link.
    pub fn url_for(&self, endpoint: &str) -> String {
        let without_query = endpoint.split('?').next().unwrap_or(endpoint);
        let path = without_query
            .strip_prefix(self.base_url.as_str())
            .or_else(|| without_query.strip_prefix(UPSTREAM_BASE))
            .unwrap_or(without_query);
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET one JSON document.
    pub async fn fetch(&self, endpoint: &str, query: &[(&str, String)]) -> SyncResult<Value> {
        let url = self.url_for(endpoint);
        let mut params: Vec<(&str, String)> = query.to_vec();
        params.push(("format", "json".to_string()));
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        let mut last_err = String::new();
        let mut attempts = 0;

        for attempt in 0..self.retry.max_retries {
            attempts = attempt + 1;
            match self.attempt(&url, &params).await {
                Ok(response) => {
                    let doc = response
                        .json::<Value>()
                        .await
                        .map_err(|source| SyncError::Decode {
                            endpoint: endpoint.to_string(),
                            source,
                        })?;
                    tokio::time::sleep(self.request_delay).await;
                    return Ok(doc);
                }
                Err(Attempt::Fatal(message)) => {
                    last_err = message;
                    break;
                }
                Err(Attempt::Retry(message)) => {
                    last_err = message;
                    if attempt + 1 < self.retry.max_retries {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            %endpoint,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_err,
                            "request failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(SyncError::Upstream {
            endpoint: endpoint.to_string(),
            attempts,
            message: last_err,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response, Attempt> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status, truncate(&body, 200));
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            Err(Attempt::Retry(message))
        } else {
            Err(Attempt::Fatal(message))
        }
    }

    /// Fetch every page of a list endpoint and return the accumulated items.
    ///
    /// `items_field` names the array to collect; when `None`, the first array
    /// in the page other than `pagination` is used. Paging starts at the
    /// caller's `offset` (default 0); the page size is always the configured
    /// limit. Stops when a page has no `pagination.next`, when the offset
    /// reaches `pagination.count`, or when a page comes back empty.
    pub async fn fetch_all_pages(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        items_field: Option<&str>,
    ) -> SyncResult<Vec<Value>> {
        let limit = i64::from(self.page_limit);
        let mut offset = query
            .iter()
            .find(|(key, _)| *key == "offset")
            .and_then(|(_, value)| value.trim().parse::<i64>().ok())
            .unwrap_or(0)
            .max(0);
        let base: Vec<(&str, String)> = query
            .iter()
            .filter(|(key, _)| *key != "offset" && *key != "limit")
            .cloned()
            .collect();
        let mut all = Vec::new();

        loop {
            let mut params = base.clone();
            params.push(("limit", limit.to_string()));
            params.push(("offset", offset.to_string()));

            let mut page = self.fetch(endpoint, &params).await?;
            let has_next = page
                .pointer("/pagination/next")
                .is_some_and(|next| !next.is_null());
            let total = page.get("pagination").and_then(|p| payload::int(p, "count"));
            let items = take_items(&mut page, items_field);
            let received = items.len();
            all.extend(items);
            offset += limit;

            debug!(
                %endpoint,
                received,
                accumulated = all.len(),
                total = ?total,
                "page fetched"
            );

            if !has_next || received == 0 {
                break;
            }
            if total.is_some_and(|total| offset >= total) {
                break;
            }
        }

        Ok(all)
    }
}

fn take_items(page: &mut Value, items_field: Option<&str>) -> Vec<Value> {
    let key = match items_field {
        Some(field) => Some(field.to_string()),
        None => page.as_object().and_then(|map| {
            map.iter()
                .find(|(k, v)| k.as_str() != "pagination" && v.is_array())
                .map(|(k, _)| k.clone())
        }),
    };

    match key.and_then(|k| page.get_mut(&k).map(Value::take)) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base_url: &str) -> ApiClient {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        };
        ApiClient::with_api_key(&config, Some("k".into())).unwrap()
    }

    #[test]
    fn backoff_doubles() {
        let retry = RetryStrategy::default();
        assert_eq!(retry.delay_for(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for(1), Duration::from_secs(2));
        assert_eq!(retry.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn upstream_links_are_rebased() {
        let c = client("http://127.0.0.1:9000/");
        assert_eq!(c.url_for("bill/118"), "http://127.0.0.1:9000/bill/118");
        assert_eq!(
            c.url_for("https://api.congress.gov/v3/bill/118/hr/1/actions?format=json"),
            "http://127.0.0.1:9000/bill/118/hr/1/actions"
        );
        assert_eq!(
            c.url_for("http://127.0.0.1:9000/member/A1?format=json"),
            "http://127.0.0.1:9000/member/A1"
        );
    }

    #[test]
    fn items_default_to_first_array() {
        let mut page = json!({"pagination": {"count": 1}, "bills": [{"a": 1}]});
        assert_eq!(take_items(&mut page, None).len(), 1);
        let mut page = json!({"members": [{"a": 1}, {"a": 2}]});
        assert_eq!(take_items(&mut page, Some("members")).len(), 2);
        assert!(take_items(&mut page, Some("missing")).is_empty());
    }
}
