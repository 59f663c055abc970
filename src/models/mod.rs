use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{IngestError, Result};

/// A calendar month, the unit the period pointer moves by
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

/// Unchecked wire form; deserializing goes through `Period::new`
#[derive(Deserialize)]
struct RawPeriod {
    year: i32,
    month: u32,
}

impl TryFrom<RawPeriod> for Period {
    type Error = IngestError;

    fn try_from(raw: RawPeriod) -> Result<Self> {
        Period::new(raw.year, raw.month)
    }
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(IngestError::Config(format!("invalid month {} for year {}", month, year)));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        Period::of(date) == self
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| IngestError::Config(format!("period '{}' must be YYYY-MM", s)))?;
        let year: i32 = year
            .parse()
            .map_err(|_| IngestError::Config(format!("invalid year in period '{}'", s)))?;
        let month: u32 = month
            .parse()
            .map_err(|_| IngestError::Config(format!("invalid month in period '{}'", s)))?;
        Period::new(year, month)
    }
}

/// Persisted ingestion progress for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source_id: String,
    /// Natural key of the last record written (last annotated id for the sentiment pass)
    pub cursor: Option<String>,
    /// Period pointer: the next period to fetch
    pub period: Period,
    /// Offset inside `period` when a full page was already consumed there
    pub offset: u32,
    pub run_count: u32,
}

impl Checkpoint {
    pub fn initial(source_id: &str, period: Period) -> Self {
        Self {
            source_id: source_id.to_string(),
            cursor: None,
            period,
            offset: 0,
            run_count: 0,
        }
    }

    /// Fetch position, ordered lexicographically
    pub fn position(&self) -> (Period, u32) {
        (self.period, self.offset)
    }
}

/// Weekly adjusted price bar for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: i64,
    pub dividend_amount: f64,
}

/// News article as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub uuid: String,
    pub title: String,
    /// Publish timestamp exactly as the provider sent it
    pub published_at: String,
    pub published_date: NaiveDate,
    pub description: Option<String>,
    pub snippet: Option<String>,
    pub language: String,
}

/// A fetched item ready for the writer
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    WeeklyBar(WeeklyBar),
    Article(NewsArticle),
}

impl Record {
    pub fn natural_key(&self) -> String {
        match self {
            Record::WeeklyBar(bar) => format!("{}:{}", bar.ticker, bar.date),
            Record::Article(article) => article.uuid.clone(),
        }
    }
}

/// Sentiment attached 1:1 to an article; empty until annotated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentAnnotation {
    pub article_id: i64,
    pub score: Option<f64>,
    pub magnitude: Option<f64>,
}

/// Article row still waiting for a sentiment score
#[derive(Debug, Clone)]
pub struct PendingArticle {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub snippet: Option<String>,
}

impl PendingArticle {
    /// Title, description and snippet joined by blank lines, empty parts dropped
    pub fn analysis_text(&self) -> String {
        [Some(self.title.as_str()), self.description.as_deref(), self.snippet.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Row counts printed before and after a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestCounts {
    pub stock: BTreeMap<String, i64>,
    pub news: i64,
    pub sentiment_scored: i64,
    pub sentiment_total: i64,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub checkpoint_dir: Option<PathBuf>,
    pub stock_tickers: Vec<String>,
    pub stock_api_key_path: String,
    pub news_api_key_path: String,
    pub alpha_vantage_base_url: String,
    pub news_api_base_url: String,
    pub max_items_per_run: usize,
    pub max_fetches_per_run: usize,
    pub stock_initial_runs: u32,
    pub news_initial_runs: u32,
    pub sentiment_initial_runs: u32,
    pub stock_start: Period,
    pub stock_end: Period,
    pub news_start: Period,
    pub news_end: Period,
    pub stock_page_size: usize,
    pub news_page_size: usize,
    pub alpha_vantage_rate_limit_per_minute: u32,
    pub news_rate_limit_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let stock_tickers: Vec<String> = env_or("STOCK_TICKERS", "DIA,SPY")
            .split(',')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        if stock_tickers.is_empty() {
            return Err(IngestError::Config("STOCK_TICKERS must name at least one ticker".into()));
        }

        let config = Config {
            database_path: env_or("DATABASE_PATH", "stock_and_news.db"),
            checkpoint_dir: std::env::var("CHECKPOINT_DIR").ok().map(PathBuf::from),
            stock_tickers,
            stock_api_key_path: env_or("STOCK_API_KEY_PATH", "api_key_stocks.txt"),
            news_api_key_path: env_or("NEWS_API_KEY_PATH", "api_key_news.txt"),
            alpha_vantage_base_url: env_or("ALPHA_VANTAGE_BASE_URL", "https://www.alphavantage.co"),
            news_api_base_url: env_or("NEWS_API_BASE_URL", "https://api.thenewsapi.com"),
            max_items_per_run: env_parse("MAX_ITEMS_PER_RUN", 25)?,
            max_fetches_per_run: env_parse("MAX_FETCHES_PER_RUN", 100)?,
            stock_initial_runs: env_parse("STOCK_INITIAL_RUNS", 3)?,
            news_initial_runs: env_parse("NEWS_INITIAL_RUNS", 4)?,
            sentiment_initial_runs: env_parse("SENTIMENT_INITIAL_RUNS", 4)?,
            stock_start: env_parse("STOCK_START", Period { year: 2020, month: 1 })?,
            stock_end: env_parse("STOCK_END", Period { year: 2024, month: 12 })?,
            news_start: env_parse("NEWS_START", Period { year: 2021, month: 1 })?,
            news_end: env_parse("NEWS_END", Period { year: 2024, month: 12 })?,
            stock_page_size: env_parse("STOCK_PAGE_SIZE", 25)?,
            // Changing this mid-backfill re-reads part of one page; duplicates are skipped
            news_page_size: env_parse("NEWS_PAGE_SIZE", 3)?,
            alpha_vantage_rate_limit_per_minute: env_parse("ALPHA_VANTAGE_RATE_LIMIT_PER_MINUTE", 5)?,
            news_rate_limit_per_minute: env_parse("NEWS_RATE_LIMIT_PER_MINUTE", 60)?,
        };

        if config.max_items_per_run == 0 || config.stock_page_size == 0 || config.news_page_size == 0 {
            return Err(IngestError::Config("item caps and page sizes must be positive".into()));
        }
        Ok(config)
    }

    pub fn stock_source_id(ticker: &str) -> String {
        format!("stock:{}", ticker)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
