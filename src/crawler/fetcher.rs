//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests of a harvest run, including:
//! - Building HTTP clients with proper user agent strings
//! - Global concurrency limiting and request pacing
//! - Honoring robots.txt
//! - Retry logic for transient failures
//! - Error classification

use crate::config::{HarvesterConfig, UserAgentConfig};
use crate::robots::{fetch_robots, origin_key, RobotsCache, RobotsRules};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use url::Url;

/// A successfully fetched document
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header value
    pub content_type: Option<String>,
    /// Raw body
    pub body: Vec<u8>,
}

impl FetchedDocument {
    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// True unless the server declared a non-HTML content type
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(true, |ct| ct.to_ascii_lowercase().contains("html"))
    }
}

/// Reasons a fetch failed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Blocked by robots.txt: {0}")]
    Disallowed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    /// Returns true for failures worth retrying
    ///
    /// | Condition | Retried |
    /// |-----------|---------|
    /// | Timeout | yes |
    /// | HTTP 408, 429, 5xx | yes |
    /// | Other HTTP status | no |
    /// | Connection refused, TLS | no |
    /// | robots.txt, bad URL | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }

    fn from_reqwest(url: &Url, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(url.to_string())
        } else if e.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// Source of documents for a harvest run
///
/// The HTTP implementation is [`HttpFetcher`]; tests substitute canned
/// responses.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetches one URL, returning the document on a 2xx response
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `harvester` - Timeouts come from here
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    harvester: &HarvesterConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(harvester.request_timeout))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Delay before the next request to a host
///
/// The larger of the configured delay and the robots.txt `Crawl-delay`,
/// with the latter capped at `max_crawl_delay`.
fn effective_delay(
    request_delay: Duration,
    robots_delay: Option<Duration>,
    max_crawl_delay: Duration,
) -> Duration {
    match robots_delay {
        Some(robots) if robots > max_crawl_delay => {
            tracing::warn!(
                "Crawl-delay of {:?} capped to {:?}",
                robots,
                max_crawl_delay
            );
            request_delay.max(max_crawl_delay)
        }
        Some(robots) => request_delay.max(robots),
        None => request_delay,
    }
}

/// Fetcher backed by reqwest
///
/// All requests share one concurrency limit and one pacing clock, so the
/// configured request delay holds across the whole run.
pub struct HttpFetcher {
    client: Client,
    agent_token: String,
    permits: Arc<Semaphore>,
    last_request: Mutex<Option<Instant>>,
    request_delay: Duration,
    max_crawl_delay: Duration,
    max_retries: u32,
    obey_robots: bool,
    robots: Mutex<RobotsCache>,
}

impl HttpFetcher {
    /// Creates a fetcher from the harvester settings
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetcher)` - Ready to fetch
    /// * `Err(reqwest::Error)` - Failed to build the HTTP client
    pub fn new(
        user_agent: &UserAgentConfig,
        harvester: &HarvesterConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, harvester)?;

        Ok(Self {
            client,
            agent_token: user_agent.crawler_name.clone(),
            permits: Arc::new(Semaphore::new(harvester.max_concurrent_requests as usize)),
            last_request: Mutex::new(None),
            request_delay: Duration::from_millis(harvester.request_delay),
            max_crawl_delay: Duration::from_secs(harvester.max_crawl_delay),
            max_retries: harvester.max_retries,
            obey_robots: harvester.obey_robots,
            robots: Mutex::new(RobotsCache::new()),
        })
    }

    /// Robots.txt rules for the origin of `url`, fetched on first use
    async fn robots_for(&self, url: &Url) -> RobotsRules {
        let origin = origin_key(url);
        let mut cache = self.robots.lock().await;

        if let Some(rules) = cache.get(&origin) {
            return rules.clone();
        }

        let rules = fetch_robots(&self.client, url).await;
        cache.insert(&origin, rules.clone());
        rules
    }

    /// Waits until `delay` has passed since the previous request
    async fn wait_turn(&self, delay: Duration) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_once(&self, url: &Url, delay: Duration) -> Result<FetchedDocument, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        self.wait_turn(delay).await;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        Ok(FetchedDocument {
            final_url,
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let mut delay = self.request_delay;
        if self.obey_robots {
            let rules = self.robots_for(&parsed).await;
            if !rules.is_allowed(parsed.as_str(), &self.agent_token) {
                return Err(FetchError::Disallowed(url.to_string()));
            }
            delay = effective_delay(
                self.request_delay,
                rules.crawl_delay(&self.agent_token),
                self.max_crawl_delay,
            );
        }

        let mut attempt = 0;
        loop {
            match self.fetch_once(&parsed, delay).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!("Retrying {} (attempt {}): {}", url, attempt, e);
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
