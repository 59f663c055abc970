use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::path::Path;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::models::{Period, Record};

pub mod alpha_vantage_client;
pub mod news_client;

pub use alpha_vantage_client::AlphaVantageClient;
pub use news_client::NewsApiClient;

/// Client-side request throttle shared by the API clients
pub struct ApiRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// Where to read one page from an upstream source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub period: Period,
    pub offset: u32,
    pub limit: usize,
}

/// One page of upstream data
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub records: Vec<Record>,
    /// Items the upstream returned, including ones dropped as malformed
    pub upstream_len: usize,
}

impl FetchedPage {
    pub fn is_exhausted(&self, limit: usize) -> bool {
        self.upstream_len < limit
    }
}

/// Paginated, time-ordered source of records
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Checkpoint key of this source
    fn source_id(&self) -> String;

    /// Records available at the requested position, oldest first.
    ///
    /// An empty page means the position has nothing to offer; rejected calls
    /// surface as `Auth` or `UpstreamUnavailable` instead.
    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchedPage>;
}

/// Read an API key from the first line of a file
pub fn load_api_key(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| IngestError::Auth(format!("cannot read API key file '{}': {}", path.display(), e)))?;
    let key = content.lines().next().unwrap_or("").trim().to_string();
    if key.is_empty() {
        return Err(IngestError::Auth(format!("API key file '{}' is empty", path.display())));
    }
    debug!("Loaded API key from {}", path.display());
    Ok(key)
}

/// Use the environment override when present, the key file otherwise
pub fn resolve_api_key(env_key: &str, path: impl AsRef<Path>) -> Result<String> {
    match std::env::var(env_key) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => load_api_key(path),
    }
}
