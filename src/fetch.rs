use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::debug;

const USER_AGENT: &str = concat!("seo_crawler/", env!("CARGO_PKG_VERSION"));
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw result of one HTTP GET, before any parsing.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// Time from sending the request until the response headers arrived.
    pub elapsed: Duration,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can turn a URL into a [`FetchedPage`].
#[allow(async_fn_in_trait)]
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let elapsed = start.elapsed();

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?
            .to_vec();

        debug!(
            "Fetched {} -> {} ({} bytes, {:.3}s)",
            url,
            status,
            body.len(),
            elapsed.as_secs_f64()
        );

        Ok(FetchedPage {
            status,
            elapsed,
            body,
        })
    }
}

/// In-memory fetcher for tests: URLs not in the map fail like an unreachable host.
#[cfg(test)]
pub struct MapFetcher {
    pages: std::collections::HashMap<String, FetchedPage>,
}

#[cfg(test)]
impl MapFetcher {
    pub fn new() -> Self {
        Self {
            pages: std::collections::HashMap::new(),
        }
    }

    pub fn with(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                status,
                elapsed: Duration::from_millis(120),
                body: body.as_bytes().to_vec(),
            },
        );
        self
    }
}

#[cfg(test)]
impl Fetch for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("connection refused: {}", url))
    }
}
