use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ApiRateLimiter, FetchRequest, FetchedPage, RecordSource};
use crate::error::{IngestError, Result};
use crate::models::{Config, Record, WeeklyBar};

const SERIES_KEY: &str = "Weekly Adjusted Time Series";

/// One dated entry of the weekly series; `bar` is None when its fields were unusable
#[derive(Debug, Clone)]
struct SeriesEntry {
    date: NaiveDate,
    bar: Option<WeeklyBar>,
}

/// Alpha Vantage weekly adjusted series for one ticker.
///
/// The endpoint returns the whole history in one response, so the series is
/// downloaded once per process and period windows are served from memory.
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    ticker: String,
    base_url: String,
    rate_limiter: Arc<ApiRateLimiter>,
    series: Mutex<Option<Arc<Vec<SeriesEntry>>>>,
}

impl AlphaVantageClient {
    pub fn new(api_key: String, ticker: &str, base_url: &str, rate_limiter: Arc<ApiRateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("stock-news-ingest/0.1")
            .build()?;

        Ok(Self {
            client,
            api_key,
            ticker: ticker.to_uppercase(),
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter,
            series: Mutex::new(None),
        })
    }

    pub fn from_config(config: &Config, api_key: String, ticker: &str, rate_limiter: Arc<ApiRateLimiter>) -> Result<Self> {
        Self::new(api_key, ticker, &config.alpha_vantage_base_url, rate_limiter)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Download the series once and keep it for the rest of the process
    async fn weekly_series(&self) -> Result<Arc<Vec<SeriesEntry>>> {
        let mut cached = self.series.lock().await;
        if let Some(series) = cached.as_ref() {
            return Ok(Arc::clone(series));
        }

        let body = self.request_series().await?;
        let series = Arc::new(parse_weekly_series(&self.ticker, &body)?);
        info!("📈 Downloaded {} weekly bars for {}", series.len(), self.ticker);
        *cached = Some(Arc::clone(&series));
        Ok(series)
    }

    async fn request_series(&self) -> Result<Value> {
        self.rate_limiter.wait().await;
        debug!("Fetching weekly adjusted series for {}", self.ticker);

        let response = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("function", "TIME_SERIES_WEEKLY_ADJUSTED"),
                ("symbol", self.ticker.as_str()),
                ("apikey", self.api_key.as_str()),
                ("datatype", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(IngestError::Auth(format!("Alpha Vantage rejected the API key ({})", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IngestError::UpstreamUnavailable(format!(
                "Alpha Vantage request failed: {} - {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IngestError::UpstreamUnavailable(format!("unreadable Alpha Vantage response: {}", e)))?;
        Ok(body)
    }
}

#[async_trait]
impl RecordSource for AlphaVantageClient {
    fn source_id(&self) -> String {
        Config::stock_source_id(&self.ticker)
    }

    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchedPage> {
        let series = self.weekly_series().await?;

        let window: Vec<&SeriesEntry> = series
            .iter()
            .filter(|entry| request.period.contains(entry.date))
            .skip(request.offset as usize)
            .take(request.limit)
            .collect();

        let records = window
            .iter()
            .filter_map(|entry| entry.bar.clone().map(Record::WeeklyBar))
            .collect();

        Ok(FetchedPage { records, upstream_len: window.len() })
    }
}

/// Turn an Alpha Vantage JSON body into dated entries, oldest first
fn parse_weekly_series(ticker: &str, body: &Value) -> Result<Vec<SeriesEntry>> {
    if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
        let lower = message.to_lowercase();
        if lower.contains("apikey") || lower.contains("api key") {
            return Err(IngestError::Auth(message.to_string()));
        }
        return Err(IngestError::UpstreamUnavailable(message.to_string()));
    }
    for key in ["Note", "Information"] {
        if let Some(message) = body.get(key).and_then(Value::as_str) {
            return Err(IngestError::UpstreamUnavailable(format!("API limit reached: {}", message)));
        }
    }

    let series = body
        .get(SERIES_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| IngestError::UpstreamUnavailable(format!("expected '{}' in API response", SERIES_KEY)))?;

    let mut entries = Vec::with_capacity(series.len());
    for (date_str, fields) in series {
        let date = match NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                warn!("⚠️ Dropping {} entry with unparsable date '{}': {}", ticker, date_str, e);
                continue;
            }
        };
        let bar = match convert_bar(ticker, date, fields) {
            Ok(bar) => Some(bar),
            Err(e) => {
                warn!("⚠️ Dropping {} bar for {}: {}", ticker, date, e);
                None
            }
        };
        entries.push(SeriesEntry { date, bar });
    }
    entries.sort_by_key(|entry| entry.date);
    Ok(entries)
}

fn convert_bar(ticker: &str, date: NaiveDate, fields: &Value) -> Result<WeeklyBar> {
    let fields = fields
        .as_object()
        .ok_or_else(|| IngestError::DataIntegrity("bar is not a JSON object".to_string()))?;

    Ok(WeeklyBar {
        ticker: ticker.to_string(),
        date,
        open: number_field(fields, "1. open")?,
        high: number_field(fields, "2. high")?,
        low: number_field(fields, "3. low")?,
        close: number_field(fields, "4. close")?,
        adjusted_close: number_field(fields, "5. adjusted close")?,
        volume: number_field::<i64>(fields, "6. volume")?,
        dividend_amount: number_field(fields, "7. dividend amount")?,
    })
}

fn number_field<T: std::str::FromStr>(fields: &Map<String, Value>, key: &str) -> Result<T> {
    let raw = fields
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::DataIntegrity(format!("missing field '{}'", key)))?;
    raw.trim()
        .parse()
        .map_err(|_| IngestError::DataIntegrity(format!("field '{}' has invalid value '{}'", key, raw)))
}
