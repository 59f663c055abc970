use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ApiRateLimiter, FetchRequest, FetchedPage, RecordSource};
use crate::error::{IngestError, Result};
use crate::models::{Config, NewsArticle, Record};

pub const NEWS_SOURCE_ID: &str = "news";

/// TheNewsAPI top stories response
#[derive(Debug, Deserialize)]
struct TopStoriesResponse {
    #[serde(default)]
    data: Vec<RawArticle>,
}

/// Article as the provider sends it; every field may be absent
#[derive(Debug, Deserialize)]
struct RawArticle {
    uuid: Option<String>,
    title: Option<String>,
    description: Option<String>,
    snippet: Option<String>,
    published_at: Option<String>,
    language: Option<String>,
}

/// Client for TheNewsAPI top stories, one calendar month per position
pub struct NewsApiClient {
    client: Client,
    api_token: String,
    base_url: String,
    categories: String,
    language: String,
    rate_limiter: Arc<ApiRateLimiter>,
}

impl NewsApiClient {
    pub fn new(api_token: String, base_url: &str, rate_limiter: Arc<ApiRateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("stock-news-ingest/0.1")
            .build()?;

        Ok(Self {
            client,
            api_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            categories: "business,politics,tech".to_string(),
            language: "en".to_string(),
            rate_limiter,
        })
    }

    pub fn from_config(config: &Config, api_token: String) -> Result<Self> {
        let rate_limiter = Arc::new(ApiRateLimiter::new(config.news_rate_limit_per_minute));
        Self::new(api_token, &config.news_api_base_url, rate_limiter)
    }
}

#[async_trait]
impl RecordSource for NewsApiClient {
    fn source_id(&self) -> String {
        NEWS_SOURCE_ID.to_string()
    }

    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchedPage> {
        let limit = request.limit.max(1);
        let page = page_number(request.offset, limit);
        let published_after = request.period.first_day().format("%Y-%m-%d").to_string();
        let published_before = request.period.last_day().format("%Y-%m-%d").to_string();

        self.rate_limiter.wait().await;
        debug!("Fetching top stories for {} (page {}, limit {})", request.period, page, limit);

        let response = self
            .client
            .get(format!("{}/v1/news/top", self.base_url))
            .query(&[
                ("api_token", self.api_token.clone()),
                ("categories", self.categories.clone()),
                ("language", self.language.clone()),
                ("published_after", published_after),
                ("published_before", published_before),
                ("limit", limit.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(IngestError::Auth(format!("TheNewsAPI rejected the API token ({})", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IngestError::UpstreamUnavailable(format!(
                "TheNewsAPI request failed: {} - {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let body: TopStoriesResponse = response
            .json()
            .await
            .map_err(|e| IngestError::UpstreamUnavailable(format!("unreadable TheNewsAPI response: {}", e)))?;

        let upstream_len = body.data.len();
        let mut records = Vec::with_capacity(upstream_len);
        for raw in body.data {
            match convert_article(raw) {
                Ok(article) => records.push(Record::Article(article)),
                Err(e) => warn!("⚠️ Dropping article from {}: {}", request.period, e),
            }
        }

        Ok(FetchedPage { records, upstream_len })
    }
}

/// 1-based page holding item `offset`.
///
/// The page starts at or before `offset`, so a stored offset that is not a
/// multiple of `limit` (page size changed between runs) re-reads a few items,
/// which the writer drops as duplicates, and never skips any. The controller
/// then adds the full page length, which lands the next offset on the
/// following page boundary.
fn page_number(offset: u32, limit: usize) -> usize {
    offset as usize / limit.max(1) + 1
}

fn convert_article(raw: RawArticle) -> Result<NewsArticle> {
    let uuid = non_empty(raw.uuid).ok_or_else(|| IngestError::DataIntegrity("article without uuid".to_string()))?;
    let title = non_empty(raw.title)
        .ok_or_else(|| IngestError::DataIntegrity(format!("article {} has no title", uuid)))?;
    let published_at = non_empty(raw.published_at)
        .ok_or_else(|| IngestError::DataIntegrity(format!("article {} has no publish date", uuid)))?;
    let published_date = parse_published_date(&published_at)
        .ok_or_else(|| IngestError::DataIntegrity(format!("article {} has invalid publish date '{}'", uuid, published_at)))?;

    Ok(NewsArticle {
        uuid,
        title,
        published_at,
        published_date,
        description: raw.description,
        snippet: raw.snippet,
        language: non_empty(raw.language).unwrap_or_else(|| "en".to_string()),
    })
}

fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }
    raw.get(..10).and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
