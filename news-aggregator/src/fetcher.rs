use crate::types::{AggregatorError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Outbound HTTP behavior shared by every integration in the pipeline.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_response_bytes: usize,
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "news-aggregator/0.1".to_string(),
            timeout_seconds: 15,
            max_retries: 3,
            retry_delay_seconds: 2,
            max_response_bytes: 8 * 1024 * 1024,
            max_redirects: 5,
        }
    }
}

/// Shared HTTP layer: one configured client, per-host rate limiting, and
/// bounded exponential-backoff retries for transient failures.
pub struct Fetcher {
    client: Client,
    config: HttpConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

/// Minimum spacing between requests to the same host.
const MIN_HOST_INTERVAL: Duration = Duration::from_secs(1);

impl Fetcher {
    pub fn new(config: HttpConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn max_response_bytes(&self) -> usize {
        self.config.max_response_bytes
    }

    /// GET `url` with `query` appended and decode the JSON response.
    ///
    /// Query values are never logged; credentials ride in them.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.apply_rate_limit(url).await?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 16),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let display_url = redacted(url);
        let mut last_error: Option<AggregatorError> = None;

        for attempt in 0..=self.config.max_retries {
            let request = self.client.get(url).query(query);
            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        if let Some(len) = response.content_length() {
                            if len as usize > self.config.max_response_bytes {
                                return Err(AggregatorError::ResponseTooLarge {
                                    size: len as usize,
                                });
                            }
                        }
                        debug!(url = %display_url, status = status.as_u16(), "fetched");
                        return Ok(response.json::<T>().await?);
                    }

                    last_error = Some(AggregatorError::General(format!(
                        "HTTP {}: {}",
                        status,
                        status.canonical_reason().unwrap_or("Unknown")
                    )));

                    // Client errors other than throttling won't heal on retry.
                    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(AggregatorError::Http(e));
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(url = %display_url, attempt = attempt + 1, ?delay, "retrying request");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        Err(last_error
            .unwrap_or_else(|| AggregatorError::General("request failed".to_string())))
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url)?;
        let host = parsed.host_str().unwrap_or("").to_string();

        let now = Instant::now();
        let mut rate_limiter = self.rate_limiter.write().await;

        if let Some(last_request) = rate_limiter.get(&host) {
            let elapsed = now.duration_since(*last_request);
            if elapsed < MIN_HOST_INTERVAL {
                let wait = MIN_HOST_INTERVAL - elapsed;
                debug!(%host, ?wait, "rate limiting");
                tokio::time::sleep(wait).await;
            }
        }

        rate_limiter.insert(host, Instant::now());
        Ok(())
    }
}

/// Strip the query string for log lines.
fn redacted(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or(""),
            parsed.path()
        ),
        Err(_) => url.to_string(),
    }
}
